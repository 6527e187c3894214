use crate::StoreError;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads a whole collection. A missing or blank file is an empty collection.
pub(crate) fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(storage_error(path, err)),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces a whole collection on disk.
pub(crate) fn write_array<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let payload = serde_json::to_string_pretty(records)
        .map_err(|err| storage_error(path, io::Error::from(err)))?;
    write_atomic(path, payload.as_bytes())?;
    debug!(event = "store_write", path = %path.display(), records = records.len());
    Ok(())
}

/// Writes to a sibling temp file and renames it over `path`. On failure the
/// target keeps its previous content.
pub(crate) fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| storage_error(parent, err))?;
    }

    let temp_path = temp_path_for(path);
    let result = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(payload)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&temp_path, path));

    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(storage_error(path, err));
    }
    Ok(())
}

pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    }
}

/// Exclusive advisory lock on the store's lock file, released on drop.
pub(crate) struct FileLock {
    file: File,
}

impl FileLock {
    pub(crate) fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| storage_error(path, err))?;
        file.lock_exclusive()
            .map_err(|err| storage_error(path, err))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub(crate) fn storage_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Storage {
        path: path.to_path_buf(),
        source,
    }
}
