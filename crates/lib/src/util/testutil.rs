//! Test utilities for confreg-lib.
//!
//! Helpers for laying out template trees and stub executables in temp
//! directories.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Writes `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, content).unwrap();
}

/// Writes an executable `/bin/sh` script with the given body.
pub fn write_script(path: &Path, body: &str) {
  write_file(path, &format!("#!/bin/sh\n{body}\n"));
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}
