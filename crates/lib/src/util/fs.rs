//! Crash-safe file replacement.
//!
//! Content is written to a hidden temp file next to the destination and
//! moved into place with a single `rename`, so readers never observe a
//! half-written file. When the destination is busy (a bind mount, for
//! instance) the rename fails with `EBUSY` and the content is copied over
//! the destination instead.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::{NamedTempFile, PersistError};
use tracing::{debug, warn};

/// Creates a hidden temp file in the same directory as `dest`.
///
/// The file is removed automatically unless it is persisted.
pub fn temp_sibling(dest: &Path) -> io::Result<NamedTempFile> {
  let dir = match dest.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  let name = dest
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();

  tempfile::Builder::new()
    .prefix(&format!(".{name}."))
    .suffix(".tmp")
    .tempfile_in(dir)
}

/// Moves `tmp` onto `dest`, falling back to an in-place copy on `EBUSY`.
///
/// On any other failure the temp file is deleted and the error returned.
pub fn persist(tmp: NamedTempFile, dest: &Path) -> io::Result<()> {
  match tmp.persist(dest) {
    Ok(_) => {
      debug!(path = %dest.display(), "file replaced");
      Ok(())
    }
    Err(err) => recover_persist(err, dest),
  }
}

fn recover_persist(err: PersistError, dest: &Path) -> io::Result<()> {
  if err.error.kind() != io::ErrorKind::ResourceBusy {
    return Err(err.error);
  }

  warn!(path = %dest.display(), "destination busy, overwriting in place");
  let contents = fs::read(err.file.path())?;
  fs::write(dest, contents)?;
  Ok(())
}

/// Writes `contents` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)?;
  }

  let mut tmp = temp_sibling(path)?;
  tmp.write_all(contents)?;
  tmp.as_file().sync_all()?;
  persist(tmp, path)
}

/// Removes a file, treating a missing file as success.
///
/// Returns whether a file was actually removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
  match fs::remove_file(path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

/// Makes `path` absolute and resolves `.` and `..` lexically.
///
/// Symlinks are not followed; two spellings of the same destination compare
/// equal after normalization.
pub fn normalize_path(path: &Path) -> PathBuf {
  let absolute = if path.is_absolute() {
    path.to_path_buf()
  } else {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")).join(path)
  };

  let mut normalized = PathBuf::new();
  for component in absolute.components() {
    match component {
      Component::ParentDir => {
        normalized.pop();
      }
      Component::CurDir => {}
      other => normalized.push(other.as_os_str()),
    }
  }
  normalized
}
