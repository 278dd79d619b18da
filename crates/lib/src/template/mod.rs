//! Template rendering.
//!
//! Rendering is two passes over the template text:
//!
//! 1. **Variables**: `@%@name@%@` becomes the registry value of `name`, a
//!    warning banner if `name` is a warning variable, or nothing.
//! 2. **Execution**: `@!@code@!@` becomes the stdout of running `code`
//!    (see [`exec`]); skipped when execution is disabled.
//!
//! Both passes scan for literal delimiters, leftmost first, and resume after
//! each replacement, so substituted text is never rescanned; the execution
//! pass also skips delimiters that arrived inside a variable's value. An
//! opening token without a partner ends the pass and stays in the output.

mod exec;
mod warning;

pub use warning::{banner, is_warning};

use std::collections::BTreeSet;
use std::io;
use std::ops::Range;

use thiserror::Error;

use crate::config::ExecConfig;
use crate::consts::VARIABLE_TOKEN;
use crate::registry::Registry;

#[derive(Debug, Error)]
pub enum RenderError {
  #[error("failed to write registry snapshot: {source}")]
  Snapshot {
    #[source]
    source: io::Error,
  },

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },
}

/// Inputs of one render.
pub struct RenderContext<'a> {
  pub registry: &'a dyn Registry,
  pub exec: &'a ExecConfig,
  /// Template files the output is generated from, for warning banners.
  pub sources: &'a [String],
}

/// Renders template bytes through both passes.
///
/// Bytes outside the delimited spans are copied through unchanged, whatever
/// their encoding. Delimiters inside substituted values are ignored by the
/// execution pass, so a value can never inject code.
pub fn render(text: &[u8], ctx: &RenderContext<'_>) -> Result<Vec<u8>, RenderError> {
  let (text, values) = variable_pass(text, ctx.registry, ctx.sources);
  if !ctx.exec.enabled {
    return Ok(text);
  }
  exec::run_blocks(text, &values, ctx.registry, ctx.exec)
}

/// Position of `needle` in `haystack` at or after `from`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
  haystack
    .get(from..)?
    .windows(needle.len())
    .position(|window| window == needle)
    .map(|pos| pos + from)
}

/// Calls `replace` for each `token`-delimited span and splices in its result.
///
/// Also returns where each replacement landed in the output.
fn substitute(text: &[u8], token: &str, mut replace: impl FnMut(&str) -> String) -> (Vec<u8>, Vec<Range<usize>>) {
  let token = token.as_bytes();
  let mut out = Vec::with_capacity(text.len());
  let mut spliced = Vec::new();
  let mut pos = 0;

  while let Some(start) = find(text, token, pos) {
    let Some(end) = find(text, token, start + token.len()) else {
      break;
    };
    out.extend_from_slice(&text[pos..start]);
    let name = String::from_utf8_lossy(&text[start + token.len()..end]);
    let value = replace(&name);
    spliced.push(out.len()..out.len() + value.len());
    out.extend_from_slice(value.as_bytes());
    pos = end + token.len();
  }
  out.extend_from_slice(&text[pos..]);
  (out, spliced)
}

fn variable_pass(text: &[u8], registry: &dyn Registry, sources: &[String]) -> (Vec<u8>, Vec<Range<usize>>) {
  substitute(text, VARIABLE_TOKEN, |name| {
    registry
      .get(name)
      .or_else(|| banner(name, sources))
      .unwrap_or_default()
  })
}

/// Runs the variable pass alone.
pub fn substitute_variables(text: &[u8], registry: &dyn Registry, sources: &[String]) -> Vec<u8> {
  variable_pass(text, registry, sources).0
}

/// Registry keys a template refers to, warning variables excluded.
pub fn scan_variables(text: &[u8]) -> BTreeSet<String> {
  let mut names = BTreeSet::new();
  substitute(text, VARIABLE_TOKEN, |name| {
    if !name.is_empty() && !is_warning(name) {
      names.insert(name.to_string());
    }
    String::new()
  });
  names
}
