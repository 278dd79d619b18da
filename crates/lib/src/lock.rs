//! Advisory lock around the handler cache.
//!
//! The engine itself takes no locks. Drivers that mutate the cache hold an
//! exclusive `flock` on `<cache dir>/.lock` for the duration of a command;
//! read-only commands take a shared one.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rustix::fs::{FlockOperation, flock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Written into the lock file by the exclusive holder.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "handler cache is locked by another confreg process: {command} (PID {pid})\n\
     If you're sure no such process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    lock_path: PathBuf,
  },

  #[error(
    "handler cache is locked (could not read lock metadata)\n\
     If you're sure no confreg process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to prepare lock file {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct CacheLock {
  file: File,
  lock_path: PathBuf,
}

impl CacheLock {
  /// Locks the directory holding `cache_file` without blocking.
  pub fn acquire(cache_file: &Path, mode: LockMode, command: &str) -> Result<Self, LockError> {
    let dir = cache_file.parent().unwrap_or(Path::new("."));
    let lock_path = dir.join(LOCK_FILENAME);
    let open_err = |source: io::Error| LockError::Open {
      path: lock_path.clone(),
      source,
    };

    std::fs::create_dir_all(dir).map_err(open_err)?;
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(open_err)?;

    let operation = match mode {
      LockMode::Shared => FlockOperation::NonBlockingLockShared,
      LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
    };
    if let Err(errno) = flock(file.as_fd(), operation) {
      let err = io::Error::from_raw_os_error(errno.raw_os_error());
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(contention_error(&lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      write_metadata(&file, command)?;
    }
    debug!(path = %lock_path.display(), ?mode, "acquired cache lock");

    Ok(Self { file, lock_path })
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  /// Metadata as written by the current holder.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }
}

fn write_metadata(file: &File, command: &str) -> Result<(), LockError> {
  let metadata = LockMetadata {
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
  };

  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;
  Ok(())
}

fn contention_error(lock_path: &Path) -> LockError {
  if let Ok(contents) = std::fs::read_to_string(lock_path)
    && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
  {
    return LockError::Contention {
      command: metadata.command,
      pid: metadata.pid,
      lock_path: lock_path.to_path_buf(),
    };
  }
  LockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}
