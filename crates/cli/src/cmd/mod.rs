//! Subcommand implementations.
//!
//! Mutating commands hold the exclusive cache lock while they run;
//! `handlers` only reads and takes a shared one.

mod commit;
mod handlers;
mod register;
mod trigger;
mod unregister;
mod update;

pub use commit::cmd_commit;
pub use handlers::cmd_handlers;
pub use register::cmd_register;
pub use trigger::cmd_trigger;
pub use unregister::cmd_unregister;
pub use update::cmd_update;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use confreg_lib::config::EngineConfig;
use confreg_lib::engine::{DispatchReport, Engine};
use confreg_lib::lock::{CacheLock, LockMode};
use confreg_lib::paths;
use confreg_lib::registry::FileRegistry;

use crate::output::{plural, print_error, print_info, print_item, print_success, symbols};

/// Settings every subcommand starts from.
pub struct Session {
  pub config: EngineConfig,
  registry: Option<PathBuf>,
}

impl Session {
  pub fn from_env(registry: Option<PathBuf>) -> Self {
    Self {
      config: EngineConfig::from_env(),
      registry,
    }
  }

  pub fn registry_path(&self) -> PathBuf {
    self
      .registry
      .clone()
      .unwrap_or_else(|| paths::registry_file(&self.config.root))
  }

  pub fn lock(&self, mode: LockMode, command: &str) -> Result<CacheLock> {
    CacheLock::acquire(&self.config.cache_file, mode, command).context("Failed to acquire cache lock")
  }

  pub fn load_registry(&self) -> Result<FileRegistry> {
    let path = self.registry_path();
    debug!(path = %path.display(), "loading registry");
    FileRegistry::load(&path).with_context(|| format!("Failed to load registry {}", path.display()))
  }

  /// Engine with handlers restored from the cache (rebuilt if unusable).
  pub fn load_engine(&self) -> Result<Engine> {
    let mut engine = Engine::with_dpkg(self.config.clone());
    engine.load().context("Failed to load handlers")?;
    Ok(engine)
  }
}

/// Prints what a batch of handlers did.
///
/// Failed handlers do not fail the command; they are listed on stderr.
pub(crate) fn print_report(report: &DispatchReport) {
  if report.invoked.is_empty() && report.failed.is_empty() {
    print_info("No handlers matched");
    return;
  }

  if !report.invoked.is_empty() {
    print_success(&format!("Ran {}", plural(report.invoked.len(), "handler")));
    for id in &report.invoked {
      print_item(symbols::ARROW, &id.to_string());
    }
  }
  for (id, error) in &report.failed {
    print_error(&format!("{id}: {error}"));
  }
}
