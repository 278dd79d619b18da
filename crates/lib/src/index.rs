//! Dependency index: which handlers run when which keys change.
//!
//! Handlers live in an arena keyed by [`HandlerId`]; patterns map to sets of
//! ids. A handler is listed under every pattern in its variable set, and
//! replacing or removing a handler keeps both sides in step.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::handler::{Handler, HandlerId, Subfile};

/// Compiles a variable pattern the way the index matches it: anchored at
/// the start of the key.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
  Regex::new(&format!("^(?:{pattern})"))
}

/// Subfiles waiting for their multifile to be declared, by multifile name.
pub type PendingSubfiles = BTreeMap<String, Vec<Subfile>>;

#[derive(Debug, Error)]
#[error("pattern '{pattern}' refers to unknown handler {id}")]
pub struct DanglingPattern {
  pattern: String,
  id: HandlerId,
}

/// Serialized shape of the index.
#[derive(Serialize, Deserialize)]
struct IndexRecord {
  handlers: Vec<Handler>,
  patterns: BTreeMap<String, BTreeSet<HandlerId>>,
}

/// Mapping from key pattern to the handlers depending on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IndexRecord", into = "IndexRecord")]
pub struct DependencyIndex {
  handlers: BTreeMap<HandlerId, Handler>,
  patterns: BTreeMap<String, BTreeSet<HandlerId>>,
}

impl TryFrom<IndexRecord> for DependencyIndex {
  type Error = DanglingPattern;

  fn try_from(record: IndexRecord) -> Result<Self, Self::Error> {
    let handlers: BTreeMap<_, _> = record.handlers.into_iter().map(|h| (h.id(), h)).collect();
    for (pattern, ids) in &record.patterns {
      if let Some(id) = ids.iter().find(|id| !handlers.contains_key(id)) {
        return Err(DanglingPattern {
          pattern: pattern.clone(),
          id: id.clone(),
        });
      }
    }
    Ok(Self {
      handlers,
      patterns: record.patterns,
    })
  }
}

impl From<DependencyIndex> for IndexRecord {
  fn from(index: DependencyIndex) -> Self {
    Self {
      handlers: index.handlers.into_values().collect(),
      patterns: index.patterns,
    }
  }
}

impl DependencyIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds or replaces a handler and lists it under each of its variables.
  pub fn insert(&mut self, handler: Handler) -> HandlerId {
    let id = handler.id();
    self.unlist(&id);
    for variable in handler.variables() {
      self.patterns.entry(variable).or_default().insert(id.clone());
    }
    self.handlers.insert(id.clone(), handler);
    id
  }

  /// Edits a handler in place and re-lists it. Returns false if it is unknown.
  pub fn update(&mut self, id: &HandlerId, edit: impl FnOnce(&mut Handler)) -> bool {
    let Some(mut handler) = self.handlers.remove(id) else {
      return false;
    };
    edit(&mut handler);
    self.insert(handler);
    true
  }

  pub fn remove(&mut self, id: &HandlerId) -> Option<Handler> {
    self.unlist(id);
    self.handlers.remove(id)
  }

  fn unlist(&mut self, id: &HandlerId) {
    if let Some(old) = self.handlers.get(id) {
      for variable in old.variables() {
        if let Some(ids) = self.patterns.get_mut(&variable) {
          ids.remove(id);
          if ids.is_empty() {
            self.patterns.remove(&variable);
          }
        }
      }
    }
  }

  pub fn get(&self, id: &HandlerId) -> Option<&Handler> {
    self.handlers.get(id)
  }

  pub fn handlers(&self) -> impl Iterator<Item = &Handler> {
    self.handlers.values()
  }

  pub fn patterns(&self) -> &BTreeMap<String, BTreeSet<HandlerId>> {
    &self.patterns
  }

  /// Handlers listed under exactly `pattern`.
  pub fn handlers_for(&self, pattern: &str) -> impl Iterator<Item = &Handler> {
    self
      .patterns
      .get(pattern)
      .into_iter()
      .flatten()
      .filter_map(|id| self.handlers.get(id))
  }

  pub fn len(&self) -> usize {
    self.handlers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handlers.is_empty()
  }

  /// Ids of every handler with a pattern matching one of `keys`.
  ///
  /// Patterns are regular expressions anchored at the start of the key. A
  /// pattern that does not compile is skipped with a warning.
  pub fn select<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> BTreeSet<HandlerId> {
    let keys: Vec<&str> = keys.into_iter().collect();
    let mut selected = BTreeSet::new();

    for (pattern, ids) in &self.patterns {
      let regex = match compile_pattern(pattern) {
        Ok(regex) => regex,
        Err(e) => {
          warn!(pattern = %pattern, error = %e, "skipping invalid variable pattern");
          continue;
        }
      };
      if keys.iter().any(|key| regex.is_match(key)) {
        selected.extend(ids.iter().cloned());
      }
    }
    selected
  }
}

/// Everything the engine knows about handlers; what the cache persists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerState {
  pub index: DependencyIndex,
  pub pending: PendingSubfiles,
  /// Multifile name to the id of its handler.
  pub multifiles: BTreeMap<String, HandlerId>,
}
