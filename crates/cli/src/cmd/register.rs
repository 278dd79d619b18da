use anyhow::{Context, Result};

use confreg_lib::lock::LockMode;

use super::Session;
use crate::output::{plural, print_error, print_item, print_success, symbols};

pub fn cmd_register(session: &Session, package: &str) -> Result<()> {
  let _lock = session.lock(LockMode::Exclusive, &format!("register {package}"))?;

  let registry = session.load_registry()?;
  let mut engine = session.load_engine()?;

  let registration = engine
    .register(package, &registry)
    .with_context(|| format!("Failed to register {package}"))?;

  print_success(&format!(
    "Registered {package} ({})",
    plural(registration.handlers.len(), "handler")
  ));
  for id in &registration.handlers {
    print_item(symbols::ARROW, &id.to_string());
  }
  // Generation failures leave the handlers registered; report them on stderr.
  for (id, error) in &registration.report.failed {
    print_error(&format!("{id}: {error}"));
  }

  Ok(())
}
