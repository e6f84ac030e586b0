//! Key pool file format.
//!
//! One key per line, blank lines ignored. Pool files are named after the
//! product label with whitespace runs collapsed and spaces encoded as `%20`,
//! e.g. `Temp%20Spoofer.txt`.

/// Normalize a submitted or stored key: trim whitespace, uppercase.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// File name of the pool for a product label.
pub fn pool_file_name(product_label: &str) -> String {
    let collapsed = product_label.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{}.txt", collapsed.replace(' ', "%20"))
}

/// Parse pool file contents into trimmed, non-empty keys in file order.
pub fn parse_pool(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Render keys back to pool file contents.
pub fn render_pool(keys: &[String]) -> String {
    keys.join("\n")
}

/// Short SHA-256 fingerprint of a normalized key, safe to put in logs.
pub fn key_fingerprint(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(&hash[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  abc123  "), "ABC123");
        assert_eq!(normalize_key("ABC123"), "ABC123");
        assert_eq!(normalize_key("\tdef-456\n"), "DEF-456");
        assert_eq!(normalize_key("   "), "");
    }

    #[test]
    fn test_pool_file_name() {
        assert_eq!(pool_file_name("Temp Spoofer"), "Temp%20Spoofer.txt");
        assert_eq!(pool_file_name("Fortnite  \t Private"), "Fortnite%20Private.txt");
        assert_eq!(pool_file_name("P1"), "P1.txt");
    }

    #[test]
    fn test_parse_pool_skips_blank_lines() {
        let keys = parse_pool("ABC-123\n\n  DEF-456  \r\n\n");
        assert_eq!(keys, vec!["ABC-123".to_string(), "DEF-456".to_string()]);
    }

    #[test]
    fn test_parse_pool_keeps_duplicates_and_order() {
        let keys = parse_pool("B\nA\nB");
        assert_eq!(keys, vec!["B", "A", "B"]);
    }

    #[test]
    fn test_render_pool() {
        let keys = vec!["ABC-123".to_string(), "DEF-456".to_string()];
        assert_eq!(render_pool(&keys), "ABC-123\nDEF-456");
        assert_eq!(render_pool(&[]), "");
    }

    #[test]
    fn test_key_fingerprint() {
        let a = key_fingerprint("ABC-123");
        assert_eq!(a, key_fingerprint("ABC-123"));
        assert_ne!(a, key_fingerprint("DEF-456"));
        assert_eq!(a.len(), 12);
        assert!(!a.contains("ABC"));
    }
}
