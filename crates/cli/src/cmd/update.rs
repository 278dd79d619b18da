use std::time::Instant;

use anyhow::{Context, Result};

use confreg_lib::engine::Engine;
use confreg_lib::lock::LockMode;

use super::Session;
use crate::output::{format_duration, plural, print_stat, print_success, print_warning};

pub fn cmd_update(session: &Session) -> Result<()> {
  let start = Instant::now();

  let _lock = session.lock(LockMode::Exclusive, "update")?;

  let mut engine = Engine::with_dpkg(session.config.clone());
  let ids = engine.update().context("Failed to rebuild handler index")?;

  let pending: usize = engine.state().pending.values().map(Vec::len).sum();
  print_success("Handler index rebuilt");
  print_stat("Handlers", &ids.len().to_string());
  print_stat("Patterns", &engine.index().patterns().len().to_string());
  if pending > 0 {
    print_warning(&format!("{} waiting for an undeclared multifile", plural(pending, "subfile")));
  }
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
