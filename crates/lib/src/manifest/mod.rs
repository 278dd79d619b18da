//! Manifest parsing.
//!
//! Manifests are RFC822-style `.info` files. Each blank-line separated
//! paragraph describes one generated artifact (or a contribution to one) and
//! the configuration keys it depends on.

mod parse;
mod types;

pub use parse::*;
pub use types::*;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
  /// Failed to read a manifest file.
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to list the manifest directory.
  #[error("failed to list manifest directory {path}: {source}")]
  List {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}
