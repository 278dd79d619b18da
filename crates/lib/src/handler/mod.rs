//! Handlers: the runtime objects that regenerate one artifact.
//!
//! A handler is built from manifest entries and knows which configuration
//! keys it depends on. Four variants exist:
//!
//! - [`FileHandler`] renders one template to one destination
//! - [`MultifileHandler`] concatenates rendered subfiles into one destination
//! - [`ScriptHandler`] runs an external script with the change diff on stdin
//! - [`ModuleHandler`] calls a registered in-process [`Module`]
//!
//! Handlers are identified by [`HandlerId`], the variant plus its
//! destination (file, multifile) or script/module path. Entries sharing an
//! id across manifests are merged into one handler by the [`HandlerFactory`].

mod factory;
mod file;
mod generate;
mod module;
mod multifile;
mod script;

pub use factory::{HandlerFactory, Retraction};
pub use file::FileHandler;
pub use module::{Module, ModuleError, ModuleHandler, ModuleMode, ModuleTable};
pub use multifile::{MultifileHandler, Subfile};
pub use script::{ScriptHandler, format_changes};

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::registry::{ChangeSet, Registry};
use crate::template::RenderError;

/// Handler variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
  File,
  Multifile,
  Script,
  Module,
}

impl fmt::Display for HandlerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      HandlerKind::File => "file",
      HandlerKind::Multifile => "multifile",
      HandlerKind::Script => "script",
      HandlerKind::Module => "module",
    };
    f.write_str(name)
  }
}

/// Identity of a handler: its variant and its destination or program path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerId {
  pub kind: HandlerKind,
  pub path: String,
}

impl HandlerId {
  pub fn new(kind: HandlerKind, path: impl Into<String>) -> Self {
    Self {
      kind,
      path: path.into(),
    }
  }
}

impl fmt::Display for HandlerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.path)
  }
}

/// Host-absolute destination for a manifest path such as `etc/hosts`.
pub fn destination_of(relative: &str) -> String {
  format!("/{}", relative.trim_start_matches('/'))
}

/// Everything a handler needs while it runs.
pub struct InvokeContext<'a> {
  pub config: &'a EngineConfig,
  pub registry: &'a dyn Registry,
  pub modules: &'a ModuleTable,
}

/// Errors raised while invoking a single handler.
///
/// None of these abort a dispatch; the dispatcher logs them and moves on.
#[derive(Debug, Error)]
pub enum HandlerError {
  #[error("template not found: {path}")]
  MissingTemplate { path: PathBuf },

  #[error("failed to read template {path}: {source}")]
  ReadTemplate {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to render {path}: {source}")]
  Render {
    path: PathBuf,
    #[source]
    source: RenderError,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to set ownership of {path}: {message}")]
  Ownership { path: PathBuf, message: String },

  #[error("failed to run script {path}: {source}")]
  Script {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("script {path} exited with code {code:?}")]
  ScriptFailed { path: PathBuf, code: Option<i32> },

  #[error(transparent)]
  Module(#[from] ModuleError),
}

/// A handler of any variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Handler {
  File(FileHandler),
  Multifile(MultifileHandler),
  Script(ScriptHandler),
  Module(ModuleHandler),
}

impl Handler {
  pub fn id(&self) -> HandlerId {
    match self {
      Handler::File(h) => HandlerId::new(HandlerKind::File, &h.destination),
      Handler::Multifile(h) => HandlerId::new(HandlerKind::Multifile, &h.destination),
      Handler::Script(h) => HandlerId::new(HandlerKind::Script, &h.script),
      Handler::Module(h) => HandlerId::new(HandlerKind::Module, &h.module),
    }
  }

  pub fn kind(&self) -> HandlerKind {
    match self {
      Handler::File(_) => HandlerKind::File,
      Handler::Multifile(_) => HandlerKind::Multifile,
      Handler::Script(_) => HandlerKind::Script,
      Handler::Module(_) => HandlerKind::Module,
    }
  }

  /// Key patterns this handler depends on. Patterns may be regular expressions.
  pub fn variables(&self) -> BTreeSet<String> {
    match self {
      Handler::File(h) => h.variables.clone(),
      Handler::Multifile(h) => h.all_variables(),
      Handler::Script(h) => h.variables.clone(),
      Handler::Module(h) => h.variables.clone(),
    }
  }

  /// Host-absolute path this handler writes, if it writes one.
  pub fn destination(&self) -> Option<&str> {
    match self {
      Handler::File(h) => Some(&h.destination),
      Handler::Multifile(h) => Some(&h.destination),
      Handler::Script(_) | Handler::Module(_) => None,
    }
  }

  /// Whether the package-owned file at the destination must be diverted.
  pub fn needs_diversion(&self) -> bool {
    match self {
      Handler::File(_) => true,
      Handler::Multifile(h) => h.needs_diversion(),
      Handler::Script(_) | Handler::Module(_) => false,
    }
  }

  /// Regenerates the artifact for `changes`.
  pub fn invoke(&self, ctx: &InvokeContext<'_>, changes: &ChangeSet) -> Result<(), HandlerError> {
    match self {
      Handler::File(h) => h.invoke(ctx, changes),
      Handler::Multifile(h) => h.invoke(ctx, changes),
      Handler::Script(h) => h.invoke(ctx, changes),
      Handler::Module(h) => h.invoke(ctx, changes),
    }
  }
}
