use std::path::PathBuf;

use anyhow::Result;

use confreg_lib::lock::LockMode;

use super::{Session, print_report};

pub fn cmd_commit(session: &Session, files: &[PathBuf]) -> Result<()> {
  let _lock = session.lock(LockMode::Exclusive, "commit")?;

  let registry = session.load_registry()?;
  let engine = session.load_engine()?;

  let report = engine.commit(&registry, files);
  print_report(&report);

  Ok(())
}
