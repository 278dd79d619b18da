//! The configuration registry as seen by the engine.
//!
//! The engine only reads values; scope precedence and persistence belong to
//! the registry itself. [`MemoryRegistry`] backs tests and embedders,
//! [`FileRegistry`] reads the flat `key: value` file the CLI works with.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::APP_NAME;
use crate::util::fs::write_atomic;

/// Changed keys mapped to `(old, new)`; `None` means unset.
pub type ChangeSet = BTreeMap<String, (Option<String>, Option<String>)>;

/// Read access plus bulk update, as offered by the configuration registry.
pub trait Registry {
  /// Current value of `key`.
  fn get(&self, key: &str) -> Option<String>;

  /// Every set key with its value.
  fn items(&self) -> Vec<(String, String)>;

  /// Applies `changes` (`None` unsets) and reports what actually changed.
  fn update(&mut self, changes: BTreeMap<String, Option<String>>) -> ChangeSet;
}

fn apply_changes(values: &mut BTreeMap<String, String>, changes: BTreeMap<String, Option<String>>) -> ChangeSet {
  let mut changed = ChangeSet::new();
  for (key, new) in changes {
    let old = match &new {
      Some(value) => values.insert(key.clone(), value.clone()),
      None => values.remove(&key),
    };
    if old != new {
      changed.insert(key, (old, new));
    }
  }
  changed
}

/// Registry held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegistry {
  values: BTreeMap<String, String>,
}

impl MemoryRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.values.insert(key.into(), value.into());
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryRegistry {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
    }
  }
}

impl Registry for MemoryRegistry {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }

  fn items(&self) -> Vec<(String, String)> {
    self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }

  fn update(&mut self, changes: BTreeMap<String, Option<String>>) -> ChangeSet {
    apply_changes(&mut self.values, changes)
  }
}

/// Errors reading or writing a registry file.
#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("failed to read registry {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write registry {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Registry backed by a `key: value` line file.
///
/// Lines starting with `#` and blank lines are ignored. A missing file is
/// an empty registry.
#[derive(Debug, Clone)]
pub struct FileRegistry {
  path: PathBuf,
  values: BTreeMap<String, String>,
}

impl FileRegistry {
  pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
    let path = path.into();
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "registry file not found, starting empty");
        String::new()
      }
      Err(source) => return Err(RegistryError::Read { path, source }),
    };

    Ok(Self {
      values: parse_values(&content),
      path,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Writes the current values back, replacing the file atomically.
  pub fn save(&self) -> Result<(), RegistryError> {
    let mut content = format!("# {APP_NAME} registry\n\n");
    for (key, value) in &self.values {
      content.push_str(&format!("{key}: {value}\n"));
    }
    write_atomic(&self.path, content.as_bytes()).map_err(|source| RegistryError::Write {
      path: self.path.clone(),
      source,
    })
  }
}

fn parse_values(content: &str) -> BTreeMap<String, String> {
  content
    .lines()
    .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
    .filter_map(|line| {
      let (key, value) = line.split_once(':')?;
      let value = value.strip_prefix(' ').unwrap_or(value);
      Some((key.trim().to_string(), value.to_string()))
    })
    .collect()
}

impl Registry for FileRegistry {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }

  fn items(&self) -> Vec<(String, String)> {
    self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }

  fn update(&mut self, changes: BTreeMap<String, Option<String>>) -> ChangeSet {
    apply_changes(&mut self.values, changes)
  }
}
