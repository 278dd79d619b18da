//! Persisted handler state.
//!
//! # Format
//!
//! ```text
//! confreg handler cache, version 1
//! <len>
//! <dependency index JSON>
//! <len>
//! <pending subfiles JSON>
//! <len>
//! <multifile ids JSON>
//! ```
//!
//! Each record is its byte length on a line of its own followed by exactly
//! that many bytes and a newline. Anything else, including a version outside
//! [`MIN_VERSION`]..=[`MAX_VERSION`] or bytes after the last record, rejects
//! the whole file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::index::HandlerState;
use crate::util::fs::write_atomic;

const MARKER: &str = "confreg handler cache, version ";

pub const MIN_VERSION: u32 = 1;
pub const MAX_VERSION: u32 = 1;

const RECORDS: [&str; 3] = ["index", "pending", "multifiles"];

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to read cache {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write cache {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cache header missing or malformed")]
  Marker,

  #[error("unsupported cache version {0}")]
  Version(u32),

  #[error("cache record '{0}' is truncated or has a bad length")]
  Length(&'static str),

  #[error("cache record '{record}' is invalid: {source}")]
  Json {
    record: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("unexpected data after the last cache record")]
  TrailingBytes,
}

impl CacheError {
  /// The underlying I/O error of a read or write failure.
  pub fn io_kind(&self) -> Option<io::ErrorKind> {
    match self {
      CacheError::Read { source, .. } | CacheError::Write { source, .. } => Some(source.kind()),
      _ => None,
    }
  }
}

fn push_record<T: Serialize>(out: &mut Vec<u8>, name: &'static str, value: &T) -> Result<(), CacheError> {
  let json = serde_json::to_vec(value).map_err(|source| CacheError::Json { record: name, source })?;
  out.extend_from_slice(format!("{}\n", json.len()).as_bytes());
  out.extend_from_slice(&json);
  out.push(b'\n');
  Ok(())
}

/// Serializes `state` in the current format version.
pub fn encode(state: &HandlerState) -> Result<Vec<u8>, CacheError> {
  let mut out = format!("{MARKER}{MAX_VERSION}\n").into_bytes();
  push_record(&mut out, RECORDS[0], &state.index)?;
  push_record(&mut out, RECORDS[1], &state.pending)?;
  push_record(&mut out, RECORDS[2], &state.multifiles)?;
  Ok(out)
}

/// Writes `state` to `path`, replacing any previous cache atomically.
pub fn save(path: &Path, state: &HandlerState) -> Result<(), CacheError> {
  let bytes = encode(state)?;
  write_atomic(path, &bytes).map_err(|source| CacheError::Write {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(path = %path.display(), bytes = bytes.len(), "handler cache written");
  Ok(())
}

/// Reads the state written by [`save`].
pub fn load(path: &Path) -> Result<HandlerState, CacheError> {
  let bytes = fs::read(path).map_err(|source| CacheError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  decode(&bytes)
}

/// Splits off one `\n`-terminated line.
fn take_line(input: &[u8]) -> Option<(&[u8], &[u8])> {
  let end = input.iter().position(|&b| b == b'\n')?;
  Some((&input[..end], &input[end + 1..]))
}

fn take_record<'a, T: DeserializeOwned>(input: &'a [u8], name: &'static str) -> Result<(T, &'a [u8]), CacheError> {
  let (len, rest) = take_line(input).ok_or(CacheError::Length(name))?;
  let len: usize = std::str::from_utf8(len)
    .ok()
    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    .and_then(|digits| digits.parse().ok())
    .ok_or(CacheError::Length(name))?;

  if len >= rest.len() || rest[len] != b'\n' {
    return Err(CacheError::Length(name));
  }
  let value = serde_json::from_slice(&rest[..len]).map_err(|source| CacheError::Json { record: name, source })?;
  Ok((value, &rest[len + 1..]))
}

/// Parses cache bytes, validating header, version and every record.
pub fn decode(bytes: &[u8]) -> Result<HandlerState, CacheError> {
  let (header, rest) = take_line(bytes).ok_or(CacheError::Marker)?;
  let version = std::str::from_utf8(header)
    .ok()
    .and_then(|header| header.strip_prefix(MARKER))
    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    .and_then(|digits| digits.parse::<u32>().ok())
    .ok_or(CacheError::Marker)?;
  if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
    return Err(CacheError::Version(version));
  }

  let (index, rest) = take_record(rest, RECORDS[0])?;
  let (pending, rest) = take_record(rest, RECORDS[1])?;
  let (multifiles, rest) = take_record(rest, RECORDS[2])?;
  if !rest.is_empty() {
    return Err(CacheError::TrailingBytes);
  }

  Ok(HandlerState {
    index,
    pending,
    multifiles,
  })
}
