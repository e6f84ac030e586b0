//! Atomic whole-file writes (temp file + rename).

use std::io;
use std::path::Path;

/// Replace `path` with `contents` via a sibling temp file and rename.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let mut temp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    tokio::fs::write(&temp_path, contents).await?;
    tokio::fs::rename(&temp_path, path).await
}
