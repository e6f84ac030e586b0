//! File-backed entitlement ledger.
//!
//! The ledger file is read once at open and rewritten in full on every append.
//! Appends are serialized by a writer mutex; readers work from an immutable
//! snapshot published through a `watch` channel and never wait on writers.

use crate::ledger::record::{EntitlementRecord, FIELD_DELIMITER};
use crate::persist::write_atomic;
use crate::pool::format::{key_fingerprint, normalize_key};
use crate::KeyledgerError;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// One line of the ledger file.
#[derive(Debug, Clone)]
enum LedgerLine {
    Record(EntitlementRecord),
    /// Unparseable line, kept verbatim so rewrites never lose data.
    Raw(String),
}

impl LedgerLine {
    fn render(&self) -> String {
        match self {
            Self::Record(record) => record.to_line(),
            Self::Raw(line) => line.clone(),
        }
    }
}

/// Point-in-time view of the ledger, indexed for lookups.
#[derive(Debug, Clone, Default)]
pub struct LedgerIndex {
    records: Vec<EntitlementRecord>,
    consumed: HashSet<String>,
    grants: HashMap<String, HashSet<String>>,
}

impl LedgerIndex {
    fn insert(&mut self, record: EntitlementRecord) {
        self.consumed.insert(normalize_key(&record.redeemed_key));
        self.grants
            .entry(record.user_id.clone())
            .or_default()
            .insert(record.product_label.clone());
        self.records.push(record);
    }

    // A malformed line may still name a consumed key; retire every field.
    fn insert_raw(&mut self, line: &str) {
        for field in line.split(FIELD_DELIMITER) {
            let field = normalize_key(field);
            if !field.is_empty() {
                self.consumed.insert(field);
            }
        }
    }

    /// All well-formed records in append order.
    pub fn records(&self) -> &[EntitlementRecord] {
        &self.records
    }

    /// Whether any record has redeemed `key` (normalized).
    pub fn is_key_consumed(&self, key: &str) -> bool {
        self.consumed.contains(&normalize_key(key))
    }

    /// Whether `user_id` holds a record for exactly `product_label`.
    pub fn has_access(&self, user_id: &str, product_label: &str) -> bool {
        self.grants
            .get(user_id)
            .is_some_and(|labels| labels.contains(product_label))
    }

    /// Records belonging to `user_id`, in append order.
    pub fn entitlements_for(&self, user_id: &str) -> Vec<EntitlementRecord> {
        self.records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

/// The entitlement ledger.
pub struct EntitlementLedger {
    path: PathBuf,
    lines: Mutex<Vec<LedgerLine>>,
    snapshot: watch::Sender<Arc<LedgerIndex>>,
}

impl EntitlementLedger {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    ///
    /// Malformed lines are skipped for lookups (with a warning) but kept for
    /// rewrites.
    pub async fn open(path: PathBuf) -> Result<Self, KeyledgerError> {
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(KeyledgerError::LedgerIO(format!(
                    "Failed to read ledger {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let mut lines = Vec::new();
        let mut index = LedgerIndex::default();
        for (number, raw) in contents.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            match EntitlementRecord::parse_line(raw) {
                Some(record) => {
                    index.insert(record.clone());
                    lines.push(LedgerLine::Record(record));
                }
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        line = number + 1,
                        "skipping malformed ledger line"
                    );
                    index.insert_raw(raw);
                    lines.push(LedgerLine::Raw(raw.to_string()));
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            records = index.records.len(),
            "entitlement ledger opened"
        );

        let (snapshot, _) = watch::channel(Arc::new(index));
        Ok(Self {
            path,
            lines: Mutex::new(lines),
            snapshot,
        })
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest published view of the ledger.
    pub fn snapshot(&self) -> Arc<LedgerIndex> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// All well-formed records.
    pub fn load_all(&self) -> Vec<EntitlementRecord> {
        self.snapshot().records().to_vec()
    }

    /// Whether `key` has already been redeemed by anyone.
    pub fn is_key_consumed(&self, key: &str) -> bool {
        self.snapshot().is_key_consumed(key)
    }

    /// Whether `user_id` holds `product_label`.
    pub fn has_access(&self, user_id: &str, product_label: &str) -> bool {
        self.snapshot().has_access(user_id, product_label)
    }

    /// Records belonging to `user_id`.
    pub fn entitlements_for(&self, user_id: &str) -> Vec<EntitlementRecord> {
        self.snapshot().entitlements_for(user_id)
    }

    /// Append a record and persist the whole ledger.
    ///
    /// The key uniqueness check is repeated under the writer lock, so
    /// concurrent appends of the same key cannot both succeed. The new
    /// snapshot is published only after the file has been replaced.
    ///
    /// # Errors
    /// - `KeyAlreadyConsumed` - A record for this key already exists
    /// - `LedgerIO` - The ledger file could not be written
    pub async fn append(
        &self,
        record: EntitlementRecord,
    ) -> Result<Arc<LedgerIndex>, KeyledgerError> {
        let mut lines = self.lines.lock().await;

        let current = self.snapshot();
        if current.is_key_consumed(&record.redeemed_key) {
            return Err(KeyledgerError::KeyAlreadyConsumed);
        }

        let mut rendered: Vec<String> = lines.iter().map(LedgerLine::render).collect();
        rendered.push(record.to_line());

        write_atomic(&self.path, &rendered.join("\n"))
            .await
            .map_err(|e| {
                tracing::error!(
                    path = %self.path.display(),
                    key = %key_fingerprint(&record.redeemed_key),
                    error = %e,
                    "ledger write failed"
                );
                KeyledgerError::LedgerIO(format!(
                    "Failed to write ledger {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        let mut next = LedgerIndex::clone(&current);
        next.insert(record.clone());
        let next = Arc::new(next);

        lines.push(LedgerLine::Record(record));
        self.snapshot.send_replace(Arc::clone(&next));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::record::UserIdentity;
    use tempfile::TempDir;

    fn record(user_id: &str, key: &str, label: &str) -> EntitlementRecord {
        let user = UserIdentity::new(user_id, format!("user{}", user_id), "u@example.com");
        EntitlementRecord::new(&user, key, label).unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = EntitlementLedger::open(dir.path().join("users.txt"))
            .await
            .unwrap();
        assert!(ledger.load_all().is_empty());
        assert!(!ledger.is_key_consumed("ABC-123"));
    }

    #[tokio::test]
    async fn test_append_persists_exact_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.txt");
        let ledger = EntitlementLedger::open(path.clone()).await.unwrap();

        ledger.append(record("U1", "ABC-123", "P1")).await.unwrap();
        ledger.append(record("U2", "DEF-456", "P2")).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "U1=userU1=u@example.com=ABC-123=P1\nU2=userU2=u@example.com=DEF-456=P2"
        );
    }

    #[tokio::test]
    async fn test_access_queries() {
        let dir = TempDir::new().unwrap();
        let ledger = EntitlementLedger::open(dir.path().join("users.txt"))
            .await
            .unwrap();
        ledger.append(record("U1", "K1", "P1")).await.unwrap();
        ledger.append(record("U2", "K2", "P2")).await.unwrap();

        assert!(ledger.has_access("U1", "P1"));
        assert!(!ledger.has_access("U1", "P2"));
        assert!(!ledger.has_access("U3", "P1"));
        assert!(ledger.is_key_consumed("k1"));
        assert_eq!(ledger.entitlements_for("U1").len(), 1);
    }

    #[tokio::test]
    async fn test_append_rejects_consumed_key() {
        let dir = TempDir::new().unwrap();
        let ledger = EntitlementLedger::open(dir.path().join("users.txt"))
            .await
            .unwrap();
        ledger.append(record("U1", "ABC-123", "P1")).await.unwrap();

        let result = ledger.append(record("U2", "ABC-123", "P2")).await;
        assert!(matches!(result, Err(KeyledgerError::KeyAlreadyConsumed)));
        assert_eq!(ledger.load_all().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped_and_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(
            &path,
            "\nU1=alice=a@x=ABC-123=P1\ngarbage\nU2=b=ob=b@x=OLD-KEY=P2\n",
        )
        .unwrap();

        let ledger = EntitlementLedger::open(path.clone()).await.unwrap();
        assert_eq!(ledger.load_all().len(), 1);
        assert!(ledger.is_key_consumed("OLD-KEY"));
        assert!(!ledger.has_access("U2", "P2"));

        ledger.append(record("U3", "NEW-1", "P1")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "U1=alice=a@x=ABC-123=P1\ngarbage\nU2=b=ob=b@x=OLD-KEY=P2\nU3=userU3=u@example.com=NEW-1=P1"
        );
    }

    #[tokio::test]
    async fn test_reopen_sees_appended_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.txt");
        {
            let ledger = EntitlementLedger::open(path.clone()).await.unwrap();
            ledger.append(record("U1", "ABC-123", "P1")).await.unwrap();
        }

        let ledger = EntitlementLedger::open(path).await.unwrap();
        assert!(ledger.has_access("U1", "P1"));
        assert!(ledger.is_key_consumed("ABC-123"));
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_across_appends() {
        let dir = TempDir::new().unwrap();
        let ledger = EntitlementLedger::open(dir.path().join("users.txt"))
            .await
            .unwrap();
        let before = ledger.snapshot();

        ledger.append(record("U1", "K1", "P1")).await.unwrap();

        assert!(!before.has_access("U1", "P1"));
        assert!(ledger.snapshot().has_access("U1", "P1"));
    }
}
