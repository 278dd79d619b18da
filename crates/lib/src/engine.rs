//! The change dispatcher and handler lifecycle.
//!
//! An [`Engine`] owns everything one process run knows about handlers:
//!
//! - [`Engine::load`] restores the cached state, rebuilding on any problem
//! - [`Engine::update`] rebuilds from every manifest and reconciles diversions
//! - [`Engine::register`] / [`Engine::unregister`] add or withdraw one package
//! - [`Engine::dispatch`] runs the handlers matching a change set
//! - [`Engine::commit`] regenerates all or selected destinations
//!
//! Handler failures never abort a batch; they are logged and reported.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheError};
use crate::config::EngineConfig;
use crate::diversion::{self, Diverter, DpkgDiverter};
use crate::handler::{Handler, HandlerFactory, HandlerId, InvokeContext, ModuleTable, Retraction};
use crate::index::{DependencyIndex, HandlerState, compile_pattern};
use crate::manifest::{ManifestError, manifest_files, read_manifest};
use crate::registry::{ChangeSet, Registry};
use crate::util::fs::{normalize_path, remove_file_if_exists};

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Cache(#[from] CacheError),
}

/// Outcome of running a batch of handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
  pub invoked: Vec<HandlerId>,
  pub failed: Vec<(HandlerId, String)>,
}

/// Handlers added by [`Engine::register`] and how their first run went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
  pub handlers: Vec<HandlerId>,
  pub report: DispatchReport,
}

pub struct Engine {
  config: EngineConfig,
  state: HandlerState,
  diverter: Box<dyn Diverter>,
  modules: ModuleTable,
}

impl Engine {
  pub fn new(config: EngineConfig, diverter: Box<dyn Diverter>, modules: ModuleTable) -> Self {
    Self {
      config,
      state: HandlerState::default(),
      diverter,
      modules,
    }
  }

  /// Engine using `dpkg-divert` and no modules.
  pub fn with_dpkg(config: EngineConfig) -> Self {
    let diverter = DpkgDiverter::new(&config);
    Self::new(config, Box::new(diverter), ModuleTable::new())
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn state(&self) -> &HandlerState {
    &self.state
  }

  pub fn index(&self) -> &DependencyIndex {
    &self.state.index
  }

  /// Restores handler state from the cache, or rebuilds it with [`Engine::update`].
  pub fn load(&mut self) -> Result<(), EngineError> {
    match cache::load(&self.config.cache_file) {
      Ok(state) => {
        debug!(handlers = state.index.len(), "loaded handler cache");
        self.state = state;
        Ok(())
      }
      Err(e) => {
        debug!(error = %e, "handler cache unusable, rebuilding");
        self.update().map(|_| ())
      }
    }
  }

  /// Rebuilds every handler from the manifest directory.
  pub fn update(&mut self) -> Result<Vec<HandlerId>, EngineError> {
    self.state = HandlerState::default();

    let manifests = manifest_files(&self.config.manifest_dir)?;
    let mut factory = HandlerFactory::new(&mut self.state, &self.config);
    for path in &manifests {
      match read_manifest(path) {
        Ok(entries) => {
          for entry in &entries {
            factory.build(entry);
          }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable manifest"),
      }
    }
    info!(
      manifests = manifests.len(),
      handlers = self.state.index.len(),
      "rebuilt handler index"
    );

    match diversion::reconcile(self.state.index.handlers(), self.diverter.as_mut(), &self.config.root) {
      Ok(report) if !report.is_empty() => {
        info!(installed = report.installed.len(), removed = report.removed.len(), "reconciled diversions")
      }
      Ok(_) => {}
      Err(e) => warn!(error = %e, "failed to reconcile diversions"),
    }

    self.save_cache()?;
    Ok(self.state.index.handlers().map(Handler::id).collect())
  }

  fn save_cache(&self) -> Result<(), EngineError> {
    match cache::save(&self.config.cache_file, &self.state) {
      Err(e) if e.io_kind() == Some(io::ErrorKind::PermissionDenied) => {
        warn!(error = %e, "not permitted to refresh the handler cache");
        Ok(())
      }
      other => other.map_err(EngineError::from),
    }
  }

  /// Adds the handlers of `package` and generates their output once.
  pub fn register(&mut self, package: &str, registry: &dyn Registry) -> Result<Registration, EngineError> {
    let entries = read_manifest(&self.config.manifest_path(package))?;

    let mut factory = HandlerFactory::new(&mut self.state, &self.config);
    let ids: BTreeSet<HandlerId> = entries.iter().filter_map(|entry| factory.build(entry)).collect();
    info!(package = %package, handlers = ids.len(), "registering package");

    let handlers = ids.iter().filter_map(|id| self.state.index.get(id));
    if let Err(e) = diversion::install_missing(handlers, self.diverter.as_mut(), &self.config.root) {
      warn!(error = %e, "failed to install diversions");
    }

    let mut report = DispatchReport::default();
    for id in &ids {
      if let Some(handler) = self.state.index.get(id) {
        self.run(handler, &seed_changes(handler, registry), registry, &mut report);
      }
    }

    self.save_cache()?;
    Ok(Registration {
      handlers: ids.into_iter().collect(),
      report,
    })
  }

  /// Withdraws the handlers of `package`; returns those that no longer exist.
  ///
  /// The cache is deleted rather than rewritten, so the next [`Engine::load`]
  /// rebuilds from scratch.
  pub fn unregister(&mut self, package: &str, registry: &dyn Registry) -> Result<Vec<Handler>, EngineError> {
    let entries = read_manifest(&self.config.manifest_path(package))?;

    let mut obsolete = Vec::new();
    let mut touched = BTreeSet::new();
    let mut factory = HandlerFactory::new(&mut self.state, &self.config);
    for entry in &entries {
      match factory.retract(entry) {
        Retraction::Removed(handler) => obsolete.push(handler),
        Retraction::Updated(id) => {
          touched.insert(id);
        }
        Retraction::Unchanged => {}
      }
    }
    info!(package = %package, obsolete = obsolete.len(), "unregistering package");

    let root = self.config.root.clone();
    for handler in &obsolete {
      if let Err(e) = diversion::release(self.diverter.as_mut(), &root, handler) {
        warn!(handler = %handler.id(), error = %e, "failed to remove diversion");
      }
    }

    let mut report = DispatchReport::default();
    for id in &touched {
      let Some(Handler::Multifile(multi)) = self.state.index.get(id) else {
        continue;
      };
      if multi.needs_diversion() {
        let handler = Handler::Multifile(multi.clone());
        self.run(&handler, &seed_changes(&handler, registry), registry, &mut report);
      } else if let Err(e) = diversion::release(self.diverter.as_mut(), &root, &Handler::Multifile(multi.clone())) {
        warn!(handler = %id, error = %e, "failed to remove diversion");
      }
    }

    match remove_file_if_exists(&self.config.cache_file) {
      Ok(_) => {}
      Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
        warn!(error = %e, "not permitted to remove the handler cache");
      }
      Err(source) => {
        return Err(
          CacheError::Write {
            path: self.config.cache_file.clone(),
            source,
          }
          .into(),
        );
      }
    }

    Ok(obsolete)
  }

  /// Runs every handler with a pattern matching a changed key, each once.
  pub fn dispatch(&self, registry: &dyn Registry, changes: &ChangeSet) -> DispatchReport {
    let ids = self.state.index.select(changes.keys().map(String::as_str));
    debug!(changed = changes.len(), handlers = ids.len(), "dispatching changes");

    let mut report = DispatchReport::default();
    for id in &ids {
      if let Some(handler) = self.state.index.get(id) {
        self.run(handler, changes, registry, &mut report);
      }
    }
    report
  }

  /// Regenerates every handler, or only those writing one of `files`.
  ///
  /// Paths may name the host destination (`/etc/hosts`) or its location
  /// below the configured root.
  pub fn commit(&self, registry: &dyn Registry, files: &[PathBuf]) -> DispatchReport {
    let selected: Vec<&Handler> = if files.is_empty() {
      self.state.index.handlers().collect()
    } else {
      let wanted: Vec<PathBuf> = files.iter().map(|file| normalize_path(file)).collect();
      let mut matched = vec![false; wanted.len()];

      let selected = self
        .state
        .index
        .handlers()
        .filter(|handler| {
          let Some(dest) = handler.destination() else {
            return false;
          };
          let host = normalize_path(Path::new(dest));
          let physical = normalize_path(&self.config.destination(dest));
          let mut hit = false;
          for (i, path) in wanted.iter().enumerate() {
            if *path == host || *path == physical {
              matched[i] = true;
              hit = true;
            }
          }
          hit
        })
        .collect();

      for (file, found) in files.iter().zip(&matched) {
        if !found {
          warn!(path = %file.display(), "no handler generates this file");
        }
      }
      selected
    };

    let mut report = DispatchReport::default();
    for handler in selected {
      self.run(handler, &seed_changes(handler, registry), registry, &mut report);
    }
    report
  }

  fn run(&self, handler: &Handler, changes: &ChangeSet, registry: &dyn Registry, report: &mut DispatchReport) {
    let id = handler.id();
    let ctx = InvokeContext {
      config: &self.config,
      registry,
      modules: &self.modules,
    };

    match handler.invoke(&ctx, changes) {
      Ok(()) => {
        debug!(handler = %id, "handler finished");
        report.invoked.push(id);
      }
      Err(e) => {
        warn!(handler = %id, error = %e, "handler failed");
        report.failed.push((id, e.to_string()));
      }
    }
  }
}

fn is_pattern(variable: &str) -> bool {
  variable.chars().any(|c| ".*+?()[]{}|^$\\".contains(c))
}

/// Change set that makes a handler generate from current values.
///
/// Plain variables map to `(None, current)`. A variable that is a regular
/// expression contributes every live key it matches instead.
pub fn seed_changes(handler: &Handler, registry: &dyn Registry) -> ChangeSet {
  let mut changes = ChangeSet::new();
  let mut items: Option<Vec<(String, String)>> = None;

  for variable in handler.variables() {
    if !is_pattern(&variable) {
      let value = registry.get(&variable);
      changes.insert(variable, (None, value));
      continue;
    }

    let pattern = match compile_pattern(&variable) {
      Ok(pattern) => pattern,
      Err(e) => {
        warn!(pattern = %variable, error = %e, "skipping invalid variable pattern");
        continue;
      }
    };
    let items = items.get_or_insert_with(|| registry.items());
    for (key, value) in items.iter() {
      if pattern.is_match(key) {
        changes.insert(key.clone(), (None, Some(value.clone())));
      }
    }
  }
  changes
}
