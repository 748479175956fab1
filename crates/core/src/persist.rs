//! Whole-document JSON persistence shared by every file-backed store.
//!
//! Reads are forgiving: a missing or unparseable file yields the caller's
//! default and a warning. Writes go to a sibling temp file that is then
//! renamed over the target, so a crash mid-write leaves the old document.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::warn;

use crate::error::StoreError;

/// Read and parse `path`, falling back to `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable store file, treating as empty");
            return T::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt store file, treating as empty");
            T::default()
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |reason: String| StoreError::Write {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_err(format!("create dir: {e}")))?;
    }

    let body = serde_json::to_string_pretty(value).map_err(|e| write_err(e.to_string()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".into());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    std::fs::write(&tmp, body).map_err(|e| write_err(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        write_err(format!("rename: {e}"))
    })
}
