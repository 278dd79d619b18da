use std::collections::BTreeSet;
use std::path::Path;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{HandlerError, InvokeContext};
use crate::consts::VARIABLE_TOKEN;
use crate::registry::ChangeSet;
use crate::util::process::run_with_input;

/// Runs an external script with mode `generate` when its keys change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptHandler {
  /// Path relative to the scripts directory.
  pub script: String,
  pub variables: BTreeSet<String>,
}

impl ScriptHandler {
  pub fn new(script: &str) -> Self {
    Self {
      script: script.to_string(),
      variables: BTreeSet::new(),
    }
  }

  pub(crate) fn invoke(&self, ctx: &InvokeContext<'_>, changes: &ChangeSet) -> Result<(), HandlerError> {
    let path = ctx.config.script_path(&self.script);
    if !path.is_file() {
      debug!(path = %path.display(), "script not installed, skipping");
      return Ok(());
    }
    run_script(&path, "generate", changes)
  }
}

/// Renders the change diff fed to scripts on stdin.
///
/// One `key@%@old@%@new` line per key; keys that were set or unset
/// (either side empty) are left out.
pub fn format_changes(changes: &ChangeSet) -> String {
  let mut out = String::new();
  for (key, (old, new)) in changes {
    if let (Some(old), Some(new)) = (old, new)
      && !old.is_empty()
      && !new.is_empty()
    {
      out.push_str(&format!("{key}{VARIABLE_TOKEN}{old}{VARIABLE_TOKEN}{new}\n"));
    }
  }
  out
}

/// Runs `path mode` with the change diff on stdin; stdout and stderr pass through.
pub(crate) fn run_script(path: &Path, mode: &str, changes: &ChangeSet) -> Result<(), HandlerError> {
  info!(path = %path.display(), mode = %mode, "running script");

  let mut command = Command::new(path);
  command.arg(mode).stdout(Stdio::inherit()).stderr(Stdio::inherit());

  let output =
    run_with_input(&mut command, format_changes(changes).into_bytes()).map_err(|source| HandlerError::Script {
      path: path.to_path_buf(),
      source,
    })?;

  if !output.status.success() {
    return Err(HandlerError::ScriptFailed {
      path: path.to_path_buf(),
      code: output.status.code(),
    });
  }
  Ok(())
}
