//! Default on-disk locations.
//!
//! Every managed path lives below a root prefix. The root is `/` on a real
//! host and can be relocated with `CONFREG_ROOT` for tests and chroots.
//!
//! # Layout
//!
//! ```text
//! <root>/etc/confreg/templates/info/     # *.info manifests
//! <root>/etc/confreg/templates/files/    # file and subfile templates
//! <root>/etc/confreg/templates/scripts/  # handler scripts
//! <root>/etc/confreg/base.conf           # registry values (CLI only)
//! <root>/var/cache/confreg/handlers.cache
//! <root>/var/lib/dpkg/diversions
//! ```

use std::path::{Path, PathBuf};

use crate::consts::{APP_NAME, ROOT_ENV};

/// Returns the root every managed path lives under.
pub fn root_dir() -> PathBuf {
  std::env::var_os(ROOT_ENV)
    .filter(|root| !root.is_empty())
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/"))
}

/// Maps a host-absolute path such as `/etc/hosts` below `root`.
pub fn under_root(root: &Path, path: &str) -> PathBuf {
  root.join(path.trim_start_matches('/'))
}

pub fn templates_dir(root: &Path) -> PathBuf {
  root.join("etc").join(APP_NAME).join("templates")
}

pub fn manifest_dir(root: &Path) -> PathBuf {
  templates_dir(root).join("info")
}

pub fn files_dir(root: &Path) -> PathBuf {
  templates_dir(root).join("files")
}

pub fn scripts_dir(root: &Path) -> PathBuf {
  templates_dir(root).join("scripts")
}

pub fn registry_file(root: &Path) -> PathBuf {
  root.join("etc").join(APP_NAME).join("base.conf")
}

pub fn cache_file(root: &Path) -> PathBuf {
  root.join("var").join("cache").join(APP_NAME).join("handlers.cache")
}

pub fn diversions_file(root: &Path) -> PathBuf {
  root.join("var").join("lib").join("dpkg").join("diversions")
}
