use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fslock::LockFile;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum JsonFileError {
    #[error("couldn't create data directory {0}")]
    CreateDir(PathBuf, #[source] std::io::Error),
    #[error("couldn't acquire file lock")]
    AcquireLock(#[source] fslock::Error),
    #[error("couldn't open {0}")]
    Open(PathBuf, #[source] std::io::Error),
    #[error("couldn't parse {0}")]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("failed to open temporary file")]
    OpenTmp(#[source] std::io::Error),
    #[error("failed to write temporary file")]
    WriteTmp(#[source] serde_json::Error),
    #[error("failed to flush temporary file")]
    FlushTmp(#[source] std::io::Error),
    #[error("failed to rename temporary file")]
    Rename(#[source] tempfile::PersistError),
    #[error("file stored in an invalid location: {0}")]
    InvalidLocation(PathBuf),
}

pub fn traceable_path(p: impl AsRef<Path>) -> impl tracing::Value {
    let path = p.as_ref();
    path.display().to_string()
}

/// Returns the path of the lock file guarding `path`.
pub fn lock_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension("lock")
}

/// Acquire the filesystem lock guarding `path`,
/// creating the parent directory if needed.
///
/// The lock is held until the returned [LockFile] is dropped.
pub fn acquire_lock(path: impl AsRef<Path>) -> Result<LockFile, JsonFileError> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .ok_or_else(|| JsonFileError::InvalidLocation(path.to_path_buf()))?;
    fs::create_dir_all(parent).map_err(|e| JsonFileError::CreateDir(parent.to_path_buf(), e))?;

    let mut lock = LockFile::open(lock_path(path).as_os_str()).map_err(JsonFileError::AcquireLock)?;
    lock.lock().map_err(JsonFileError::AcquireLock)?;
    Ok(lock)
}

/// Returns the parsed contents of `path` or `None` if it doesn't yet exist.
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Option<T>, JsonFileError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = traceable_path(path), "file not found");
        return Ok(None);
    }
    let f = File::open(path).map_err(|e| JsonFileError::Open(path.to_path_buf(), e))?;
    let parsed = serde_json::from_reader(BufReader::new(f))
        .map_err(|e| JsonFileError::Parse(path.to_path_buf(), e))?;
    Ok(Some(parsed))
}

/// Writes `value` as JSON to `path`.
///
/// The value is written to a temporary file next to `path` which is then
/// renamed, so readers never observe a partial write.
/// Callers must hold the lock returned by [acquire_lock] for the same path.
pub fn write_json_file<T: Serialize>(
    value: &T,
    path: impl AsRef<Path>,
    _lock: &LockFile,
) -> Result<(), JsonFileError> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .ok_or_else(|| JsonFileError::InvalidLocation(path.to_path_buf()))?;
    let temp_file = tempfile::NamedTempFile::new_in(parent).map_err(JsonFileError::OpenTmp)?;

    let mut writer = BufWriter::new(&temp_file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(JsonFileError::WriteTmp)?;
    writer.flush().map_err(JsonFileError::FlushTmp)?;
    drop(writer);
    temp_file.persist(path).map_err(JsonFileError::Rename)?;

    debug!(path = traceable_path(path), "wrote file");
    Ok(())
}
