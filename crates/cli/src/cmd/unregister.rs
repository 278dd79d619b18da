use anyhow::{Context, Result};

use confreg_lib::lock::LockMode;

use super::Session;
use crate::output::{plural, print_item, print_success, symbols};

pub fn cmd_unregister(session: &Session, package: &str) -> Result<()> {
  let _lock = session.lock(LockMode::Exclusive, &format!("unregister {package}"))?;

  let registry = session.load_registry()?;
  let mut engine = session.load_engine()?;

  let removed = engine
    .unregister(package, &registry)
    .with_context(|| format!("Failed to unregister {package}"))?;

  print_success(&format!(
    "Unregistered {package} ({} removed)",
    plural(removed.len(), "handler")
  ));
  for handler in &removed {
    print_item(symbols::REMOVE, &handler.id().to_string());
  }

  Ok(())
}
