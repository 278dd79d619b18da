//! Diversion reconciliation.
//!
//! A generated file replaces a file some package may own. Before it is
//! written, the package's copy is diverted to `<path>.debian` so upgrades
//! land there instead; when the handler goes away the diversion is removed
//! and the package copy moves back.
//!
//! Only local diversions of the exact shape `(path, path.debian, :)` belong
//! to us. Reconciliation compares those against the handlers that need one
//! and issues calls only for the difference, so a second run with the same
//! handlers does nothing.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::consts::{DIVERSION_SUFFIX, LOCAL_DIVERSION_OWNER};
use crate::handler::Handler;
use crate::paths::under_root;
use crate::util::fs::remove_file_if_exists;

#[derive(Debug, Error)]
pub enum DiversionError {
  #[error("failed to read diversions from {path}: {source}")]
  Record {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("{program} failed for {path} with exit code {code:?}")]
  Failed {
    program: String,
    path: String,
    code: Option<i32>,
  },

  #[error("failed to restore {path}: {source}")]
  Restore {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// One record of the system diversion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diversion {
  pub from: String,
  pub to: String,
  pub owner: String,
}

impl Diversion {
  /// A local diversion to `<from>.debian`, the only shape this engine creates.
  pub fn is_local_backup(&self) -> bool {
    self.owner == LOCAL_DIVERSION_OWNER && self.to == format!("{}{DIVERSION_SUFFIX}", self.from)
  }
}

/// Parses the dpkg diversion list: three lines per record.
pub fn parse_diversions(text: &str) -> Vec<Diversion> {
  let lines: Vec<&str> = text.lines().collect();
  lines
    .chunks_exact(3)
    .map(|record| Diversion {
      from: record[0].to_string(),
      to: record[1].to_string(),
      owner: record[2].to_string(),
    })
    .collect()
}

/// The OS diversion store.
pub trait Diverter {
  fn diversions(&self) -> Result<Vec<Diversion>, DiversionError>;

  /// Diverts host-absolute `path` to `path.debian`.
  fn add(&mut self, path: &str) -> Result<(), DiversionError>;

  /// Removes the diversion of `path`; a missing diversion is not an error.
  fn remove(&mut self, path: &str) -> Result<(), DiversionError>;
}

/// [`Diverter`] backed by `dpkg-divert`.
#[derive(Debug, Clone)]
pub struct DpkgDiverter {
  program: String,
  root: PathBuf,
  record: PathBuf,
}

impl DpkgDiverter {
  pub fn new(config: &EngineConfig) -> Self {
    Self {
      program: config.divert_program.clone(),
      root: config.root.clone(),
      record: config.diversions_file.clone(),
    }
  }

  fn run(&self, action: &str, path: &str) -> Result<(), DiversionError> {
    let mut command = Command::new(&self.program);
    if self.root != Path::new("/") {
      command.arg("--root").arg(&self.root);
    }
    command
      .args(["--quiet", "--rename", "--local", "--divert"])
      .arg(format!("{path}{DIVERSION_SUFFIX}"))
      .arg(action)
      .arg(path);

    debug!(program = %self.program, action = %action, path = %path, "running diversion tool");
    let output = command.output().map_err(|source| DiversionError::Spawn {
      program: self.program.clone(),
      source,
    })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "diversion tool stderr");
      }
      return Err(DiversionError::Failed {
        program: self.program.clone(),
        path: path.to_string(),
        code: output.status.code(),
      });
    }
    Ok(())
  }
}

impl Diverter for DpkgDiverter {
  fn diversions(&self) -> Result<Vec<Diversion>, DiversionError> {
    match fs::read_to_string(&self.record) {
      Ok(text) => Ok(parse_diversions(&text)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
      Err(source) => Err(DiversionError::Record {
        path: self.record.clone(),
        source,
      }),
    }
  }

  fn add(&mut self, path: &str) -> Result<(), DiversionError> {
    self.run("--add", path)
  }

  fn remove(&mut self, path: &str) -> Result<(), DiversionError> {
    self.run("--remove", path)
  }
}

/// Diverts `path`, then makes sure it is not left missing.
pub fn install(diverter: &mut dyn Diverter, root: &Path, path: &str) -> Result<(), DiversionError> {
  diverter.add(path)?;
  info!(path = %path, "diversion installed");

  let live = under_root(root, path);
  let backup = under_root(root, &format!("{path}{DIVERSION_SUFFIX}"));
  if !live.exists() && backup.is_file() {
    fs::copy(&backup, &live).map_err(|source| DiversionError::Restore {
      path: live.clone(),
      source,
    })?;
    debug!(path = %live.display(), "restored diverted file into place");
  }
  Ok(())
}

/// Deletes the generated file and removes its diversion.
pub fn uninstall(diverter: &mut dyn Diverter, root: &Path, path: &str) -> Result<(), DiversionError> {
  let live = under_root(root, path);
  remove_file_if_exists(&live).map_err(|source| DiversionError::Restore {
    path: live.clone(),
    source,
  })?;
  diverter.remove(path)?;
  info!(path = %path, "diversion removed");
  Ok(())
}

/// Uninstalls the diversion of a handler that is going away.
///
/// Returns `false` when nothing was removed because the handler has no
/// destination, or is a multifile still needed by its remaining subfiles.
pub fn release(diverter: &mut dyn Diverter, root: &Path, handler: &Handler) -> Result<bool, DiversionError> {
  let Some(path) = handler.destination() else {
    return Ok(false);
  };
  if let Handler::Multifile(multi) = handler
    && multi.needs_diversion()
  {
    return Ok(false);
  }
  uninstall(diverter, root, path)?;
  Ok(true)
}

/// Diversion changes made by a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
  pub installed: Vec<String>,
  pub removed: Vec<String>,
}

impl ReconcileReport {
  pub fn is_empty(&self) -> bool {
    self.installed.is_empty() && self.removed.is_empty()
  }
}

fn wanted<'h>(handlers: impl IntoIterator<Item = &'h Handler>) -> BTreeSet<String> {
  handlers
    .into_iter()
    .filter(|handler| handler.needs_diversion())
    .filter_map(|handler| handler.destination().map(str::to_string))
    .collect()
}

/// Makes our diversions exactly those `handlers` need.
pub fn reconcile<'h>(
  handlers: impl IntoIterator<Item = &'h Handler>,
  diverter: &mut dyn Diverter,
  root: &Path,
) -> Result<ReconcileReport, DiversionError> {
  let mut wanted = wanted(handlers);
  let mut stale = Vec::new();

  for diversion in diverter.diversions()? {
    if !diversion.is_local_backup() {
      continue;
    }
    if !wanted.remove(&diversion.from) {
      stale.push(diversion.from);
    }
  }

  let mut report = ReconcileReport::default();
  for path in stale {
    match uninstall(diverter, root, &path) {
      Ok(()) => report.removed.push(path),
      Err(e) => debug!(path = %path, error = %e, "ignoring failed diversion removal"),
    }
  }
  for path in wanted {
    match install(diverter, root, &path) {
      Ok(()) => report.installed.push(path),
      Err(e) => warn!(path = %path, error = %e, "failed to install diversion"),
    }
  }
  Ok(report)
}

/// Installs diversions `handlers` need that do not exist yet; never removes.
pub fn install_missing<'h>(
  handlers: impl IntoIterator<Item = &'h Handler>,
  diverter: &mut dyn Diverter,
  root: &Path,
) -> Result<Vec<String>, DiversionError> {
  let existing: BTreeSet<String> = diverter
    .diversions()?
    .into_iter()
    .filter(Diversion::is_local_backup)
    .map(|diversion| diversion.from)
    .collect();

  let mut installed = Vec::new();
  for path in wanted(handlers).difference(&existing) {
    match install(diverter, root, path) {
      Ok(()) => installed.push(path.clone()),
      Err(e) => warn!(path = %path, error = %e, "failed to install diversion"),
    }
  }
  Ok(installed)
}
