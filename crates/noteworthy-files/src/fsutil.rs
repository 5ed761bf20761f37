use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use noteworthy_core::Error;

/// Contents of `meta.json` in each database directory.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Meta {
    pub schema_version: i64,
}

/// RAII guard for file locking.
pub(crate) struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Acquire an exclusive lock on a database directory.
pub(crate) fn lock(dir: &Path) -> Result<FileLock, Error> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(".lock"))
        .map_err(|e| Error::Transient(format!("failed to open lock file: {}", e)))?;

    file.lock_exclusive()
        .map_err(|e| Error::Transient(format!("failed to acquire lock: {}", e)))?;

    Ok(FileLock { file })
}

/// Read and parse a JSON file. A missing file is `None`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Transient(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| Error::Transient(format!("failed to parse {}: {}", path.display(), e)))
}

/// Write a JSON file atomically via a temp file and rename.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Internal(format!("failed to serialize: {}", e)))?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = File::create(&temp_path)
        .map_err(|e| Error::Transient(format!("failed to create temp file: {}", e)))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| Error::Transient(format!("failed to write temp file: {}", e)))?;
    file.sync_all()
        .map_err(|e| Error::Transient(format!("failed to sync temp file: {}", e)))?;

    fs::rename(&temp_path, path)
        .map_err(|e| Error::Transient(format!("failed to rename temp file: {}", e)))
}

/// Create a database directory and return its schema version (0 when new).
pub(crate) fn prepare_dir(dir: &Path) -> Result<i64, Error> {
    fs::create_dir_all(dir).map_err(|e| {
        Error::StorageUnavailable(format!("cannot create {}: {}", dir.display(), e))
    })?;
    let meta: Option<Meta> = read_json(&dir.join("meta.json"))
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    Ok(meta.map(|m| m.schema_version).unwrap_or(0))
}
