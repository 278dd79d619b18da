//! Runs handlers as if the given keys had just changed.

use anyhow::Result;

use confreg_lib::lock::LockMode;
use confreg_lib::registry::{ChangeSet, Registry};

use super::{Session, print_report};

pub fn cmd_trigger(session: &Session, keys: &[String]) -> Result<()> {
  let _lock = session.lock(LockMode::Exclusive, "trigger")?;

  let registry = session.load_registry()?;
  let engine = session.load_engine()?;

  let changes: ChangeSet = keys.iter().map(|key| (key.clone(), (None, registry.get(key)))).collect();
  let report = engine.dispatch(&registry, &changes);
  print_report(&report);

  Ok(())
}
