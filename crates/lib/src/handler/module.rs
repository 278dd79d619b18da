//! In-process module handlers.
//!
//! Modules are plugins compiled into the embedding program and registered
//! in a [`ModuleTable`] under the path manifests refer to them by. A path
//! nobody registered behaves like a module that failed to load: the call is
//! reported and the batch continues.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{HandlerError, InvokeContext};
use crate::registry::{ChangeSet, Registry};

/// Entry point a module is called through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleMode {
  Preinst,
  Postinst,
  Handler,
}

impl ModuleMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ModuleMode::Preinst => "preinst",
      ModuleMode::Postinst => "postinst",
      ModuleMode::Handler => "handler",
    }
  }
}

impl fmt::Display for ModuleMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error)]
pub enum ModuleError {
  #[error("module '{0}' is not registered")]
  NotRegistered(String),

  #[error("module '{module}' has no {mode} function")]
  MissingFunction { module: String, mode: ModuleMode },

  #[error("module '{module}' failed: {message}")]
  Failed { module: String, message: String },
}

/// A configuration module.
///
/// `handler` runs when one of the module's keys changes. `preinst` and
/// `postinst` run around a file write when the module is named as a hook;
/// modules that are never used as hooks can leave them out.
pub trait Module {
  fn handler(&self, registry: &dyn Registry, changes: &ChangeSet) -> Result<(), ModuleError>;

  fn preinst(&self, _registry: &dyn Registry, _changes: &ChangeSet) -> Result<(), ModuleError> {
    Err(ModuleError::MissingFunction {
      module: String::new(),
      mode: ModuleMode::Preinst,
    })
  }

  fn postinst(&self, _registry: &dyn Registry, _changes: &ChangeSet) -> Result<(), ModuleError> {
    Err(ModuleError::MissingFunction {
      module: String::new(),
      mode: ModuleMode::Postinst,
    })
  }
}

/// Registered modules keyed by manifest path.
#[derive(Default)]
pub struct ModuleTable {
  modules: BTreeMap<String, Box<dyn Module>>,
}

impl fmt::Debug for ModuleTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModuleTable")
      .field("modules", &self.modules.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl ModuleTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, path: impl Into<String>, module: impl Module + 'static) {
    self.modules.insert(path.into(), Box::new(module));
  }

  pub fn contains(&self, path: &str) -> bool {
    self.modules.contains_key(path)
  }

  pub fn call(
    &self,
    path: &str,
    mode: ModuleMode,
    registry: &dyn Registry,
    changes: &ChangeSet,
  ) -> Result<(), ModuleError> {
    let module = self
      .modules
      .get(path)
      .ok_or_else(|| ModuleError::NotRegistered(path.to_string()))?;

    debug!(module = %path, mode = %mode, "calling module");
    let result = match mode {
      ModuleMode::Preinst => module.preinst(registry, changes),
      ModuleMode::Postinst => module.postinst(registry, changes),
      ModuleMode::Handler => module.handler(registry, changes),
    };

    // Default hook bodies cannot know the path they were registered under.
    result.map_err(|e| match e {
      ModuleError::MissingFunction { mode, .. } => ModuleError::MissingFunction {
        module: path.to_string(),
        mode,
      },
      other => other,
    })
  }
}

/// Calls a registered module's `handler` when its keys change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleHandler {
  pub module: String,
  pub variables: BTreeSet<String>,
}

impl ModuleHandler {
  pub fn new(module: &str) -> Self {
    Self {
      module: module.to_string(),
      variables: BTreeSet::new(),
    }
  }

  pub(crate) fn invoke(&self, ctx: &InvokeContext<'_>, changes: &ChangeSet) -> Result<(), HandlerError> {
    ctx
      .modules
      .call(&self.module, ModuleMode::Handler, ctx.registry, changes)
      .map_err(HandlerError::from)
  }
}
