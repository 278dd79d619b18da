//! `@!@code@!@` execution.
//!
//! Each block runs in its own interpreter process. The registry is written
//! once per render as a JSON object to a private temp file whose path is
//! exported as `CONFIG_REGISTRY` and `BASE_CONFIG`; the configured prelude
//! loads it before the block's code runs.

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Range;
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{RenderError, find};
use crate::config::ExecConfig;
use crate::consts::{EXECUTE_TOKEN, REGISTRY_SNAPSHOT_ENVS};
use crate::registry::Registry;
use crate::util::process::run_with_input;

/// Next delimiter at or after `from` that does not overlap a `literal` range.
fn find_token(input: &[u8], token: &[u8], mut from: usize, literal: &[Range<usize>]) -> Option<usize> {
  loop {
    let start = find(input, token, from)?;
    let end = start + token.len();
    if !literal.iter().any(|range| range.start < end && start < range.end) {
      return Some(start);
    }
    from = start + 1;
  }
}

/// Replaces every complete block in `input` with the output of its code.
///
/// Delimiters overlapping a `literal` range are plain text.
pub(crate) fn run_blocks(
  input: Vec<u8>,
  literal: &[Range<usize>],
  registry: &dyn Registry,
  exec: &ExecConfig,
) -> Result<Vec<u8>, RenderError> {
  let token = EXECUTE_TOKEN.as_bytes();
  if find_token(&input, token, 0, literal).is_none() {
    return Ok(input);
  }

  let snapshot = write_snapshot(registry)?;
  let mut output = Vec::with_capacity(input.len());
  let mut pos = 0;

  while let Some(start) = find_token(&input, token, pos, literal) {
    let Some(end) = find_token(&input, token, start + token.len(), literal) else {
      break;
    };
    output.extend_from_slice(&input[pos..start]);
    output.extend(execute(&input[start + token.len()..end], &snapshot, exec)?);
    pos = end + token.len();
  }
  output.extend_from_slice(&input[pos..]);

  Ok(output)
}

fn write_snapshot(registry: &dyn Registry) -> Result<NamedTempFile, RenderError> {
  let values: BTreeMap<String, String> = registry.items().into_iter().collect();
  let mut file = NamedTempFile::new().map_err(|source| RenderError::Snapshot { source })?;
  serde_json::to_writer(&mut file, &values).map_err(|e| RenderError::Snapshot { source: e.into() })?;
  file.flush().map_err(|source| RenderError::Snapshot { source })?;
  Ok(file)
}

fn execute(code: &[u8], snapshot: &NamedTempFile, exec: &ExecConfig) -> Result<Vec<u8>, RenderError> {
  let mut command = Command::new(&exec.program);
  command.args(&exec.args).stdout(Stdio::piped()).stderr(Stdio::inherit());
  for name in REGISTRY_SNAPSHOT_ENVS {
    command.env(name, snapshot.path());
  }

  let mut input = exec.prelude.as_bytes().to_vec();
  input.extend_from_slice(code);

  let output = run_with_input(&mut command, input).map_err(|source| RenderError::Spawn {
    program: exec.program.clone(),
    source,
  })?;

  if !output.status.success() {
    warn!(program = %exec.program, code = ?output.status.code(), "embedded code exited with an error");
  }
  debug!(bytes = output.stdout.len(), "embedded code produced output");
  Ok(output.stdout)
}
