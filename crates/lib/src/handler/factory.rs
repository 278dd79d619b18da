//! Builds handlers from manifest entries.
//!
//! Entries that name the same handler (same destination, script or module)
//! are merged into it: scalar fields are overwritten, variable and subfile
//! sets are unioned. A subfile whose multifile has not been declared yet is
//! parked in [`PendingSubfiles`](crate::index::PendingSubfiles) and attached
//! as soon as the multifile shows up.

use std::collections::BTreeSet;
use std::fs;

use tracing::debug;

use super::{
  FileHandler, Handler, HandlerId, HandlerKind, ModuleHandler, MultifileHandler, ScriptHandler, Subfile,
  destination_of,
};
use crate::config::EngineConfig;
use crate::index::HandlerState;
use crate::manifest::{FileEntry, ManifestEntry, MultifileEntry, SubfileEntry};
use crate::template::scan_variables;

/// Outcome of withdrawing one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retraction {
  /// The handler is gone from the index.
  Removed(Handler),
  /// The handler lost a contribution but is still indexed.
  Updated(HandlerId),
  /// The entry referred to nothing known.
  Unchanged,
}

pub struct HandlerFactory<'a> {
  state: &'a mut HandlerState,
  config: &'a EngineConfig,
}

impl<'a> HandlerFactory<'a> {
  pub fn new(state: &'a mut HandlerState, config: &'a EngineConfig) -> Self {
    Self { state, config }
  }

  /// Adds one entry's contribution. Returns the handler it built or changed,
  /// or `None` when the entry was deferred.
  pub fn build(&mut self, entry: &ManifestEntry) -> Option<HandlerId> {
    match entry {
      ManifestEntry::File(entry) => Some(self.build_file(entry)),
      ManifestEntry::Multifile(entry) => Some(self.build_multifile(entry)),
      ManifestEntry::Subfile(entry) => self.build_subfile(entry),
      ManifestEntry::Script(entry) => {
        let mut handler = ScriptHandler::new(&entry.script);
        handler.variables = entry.variables.clone();
        Some(self.merge_or_insert(Handler::Script(handler)))
      }
      ManifestEntry::Module(entry) => {
        let mut handler = ModuleHandler::new(&entry.module);
        handler.variables = entry.variables.clone();
        Some(self.merge_or_insert(Handler::Module(handler)))
      }
    }
  }

  fn build_file(&mut self, entry: &FileEntry) -> HandlerId {
    let mut handler = FileHandler::new(&entry.file);
    handler.variables = entry.variables.clone();
    handler.variables.extend(self.scan_template(&entry.file));
    handler.hooks = entry.hooks.clone();
    handler.ownership = entry.ownership.clone();
    self.merge_or_insert(Handler::File(handler))
  }

  fn build_multifile(&mut self, entry: &MultifileEntry) -> HandlerId {
    let name = entry.multifile.trim_start_matches('/').to_string();
    let index = &mut self.state.index;

    let id = match self.state.multifiles.get(&name) {
      Some(id) => {
        let id = id.clone();
        index.update(&id, |handler| {
          if let Handler::Multifile(multi) = handler {
            multi.def_count += 1;
            multi.variables.extend(entry.variables.iter().cloned());
            multi.hooks.merge(&entry.hooks);
            multi.ownership.merge(&entry.ownership);
          }
        });
        id
      }
      None => {
        let mut multi = MultifileHandler::new(&name);
        multi.def_count = 1;
        multi.variables = entry.variables.clone();
        multi.hooks = entry.hooks.clone();
        multi.ownership = entry.ownership.clone();
        let id = index.insert(Handler::Multifile(multi));
        self.state.multifiles.insert(name.clone(), id.clone());
        id
      }
    };

    if let Some(pending) = self.state.pending.remove(&name) {
      debug!(multifile = %name, count = pending.len(), "attaching pending subfiles");
      index.update(&id, |handler| {
        if let Handler::Multifile(multi) = handler {
          for subfile in pending {
            multi.add_subfile(&subfile.path, subfile.variables);
          }
        }
      });
    }

    id
  }

  fn build_subfile(&mut self, entry: &SubfileEntry) -> Option<HandlerId> {
    let name = entry.multifile.trim_start_matches('/').to_string();
    let path = entry.subfile.trim_start_matches('/').to_string();
    let mut variables = entry.variables.clone();
    variables.extend(self.scan_template(&path));

    if let Some(id) = self.state.multifiles.get(&name).cloned() {
      self.state.index.update(&id, |handler| {
        if let Handler::Multifile(multi) = handler {
          multi.add_subfile(&path, variables);
        }
      });
      return Some(id);
    }

    debug!(multifile = %name, subfile = %path, "multifile not declared yet, deferring subfile");
    let queue = self.state.pending.entry(name).or_default();
    match queue.iter_mut().find(|queued| queued.path == path) {
      Some(queued) => queued.variables.extend(variables),
      None => queue.push(Subfile { path, variables }),
    }
    None
  }

  fn merge_or_insert(&mut self, handler: Handler) -> HandlerId {
    let id = handler.id();
    let merged = self.state.index.update(&id, |existing| match (existing, &handler) {
      (Handler::File(old), Handler::File(new)) => {
        old.variables.extend(new.variables.iter().cloned());
        old.hooks.merge(&new.hooks);
        old.ownership.merge(&new.ownership);
      }
      (Handler::Script(old), Handler::Script(new)) => old.variables.extend(new.variables.iter().cloned()),
      (Handler::Module(old), Handler::Module(new)) => old.variables.extend(new.variables.iter().cloned()),
      _ => {}
    });
    if !merged {
      self.state.index.insert(handler);
    }
    id
  }

  /// Variables referenced by a template, if the template exists.
  fn scan_template(&self, relative: &str) -> BTreeSet<String> {
    fs::read(self.config.template_path(relative))
      .map(|bytes| scan_variables(&bytes))
      .unwrap_or_default()
  }

  /// Withdraws one entry's contribution.
  pub fn retract(&mut self, entry: &ManifestEntry) -> Retraction {
    match entry {
      ManifestEntry::File(entry) => self.remove(&HandlerId::new(HandlerKind::File, destination_of(&entry.file))),
      ManifestEntry::Script(entry) => self.remove(&HandlerId::new(HandlerKind::Script, &entry.script)),
      ManifestEntry::Module(entry) => self.remove(&HandlerId::new(HandlerKind::Module, &entry.module)),
      ManifestEntry::Multifile(entry) => {
        let name = entry.multifile.trim_start_matches('/');
        self.shrink_multifile(name, |multi| multi.def_count = multi.def_count.saturating_sub(1))
      }
      ManifestEntry::Subfile(entry) => {
        let name = entry.multifile.trim_start_matches('/');
        let path = entry.subfile.trim_start_matches('/');
        if self.state.multifiles.contains_key(name) {
          return self.shrink_multifile(name, |multi| {
            multi.remove_subfile(path);
          });
        }
        if let Some(queue) = self.state.pending.get_mut(name) {
          queue.retain(|queued| queued.path != path);
          if queue.is_empty() {
            self.state.pending.remove(name);
          }
        }
        Retraction::Unchanged
      }
    }
  }

  fn remove(&mut self, id: &HandlerId) -> Retraction {
    match self.state.index.remove(id) {
      Some(handler) => Retraction::Removed(handler),
      None => Retraction::Unchanged,
    }
  }

  fn shrink_multifile(&mut self, name: &str, edit: impl FnOnce(&mut MultifileHandler)) -> Retraction {
    let Some(id) = self.state.multifiles.get(name).cloned() else {
      return Retraction::Unchanged;
    };

    let mut orphaned = false;
    self.state.index.update(&id, |handler| {
      if let Handler::Multifile(multi) = handler {
        edit(multi);
        orphaned = multi.is_orphaned();
      }
    });

    if orphaned {
      self.state.multifiles.remove(name);
      return self.remove(&id);
    }
    Retraction::Updated(id)
  }
}
