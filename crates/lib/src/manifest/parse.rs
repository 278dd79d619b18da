//! RFC822-style paragraph parsing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{ManifestEntry, ManifestError, Paragraph};
use crate::consts::MANIFEST_SUFFIX;

/// Splits manifest text into paragraphs.
///
/// - paragraphs are separated by blank lines
/// - `Key: value` starts a field; repeated keys accumulate
/// - lines starting with a space or tab continue the previous field
/// - lines starting with `#` are comments
pub fn parse_paragraphs(text: &str) -> Vec<Paragraph> {
  let mut paragraphs = Vec::new();
  let mut current = Paragraph::default();
  let mut last_key: Option<String> = None;

  for line in text.lines() {
    if line.trim().is_empty() {
      if !current.is_empty() {
        paragraphs.push(std::mem::take(&mut current));
      }
      last_key = None;
      continue;
    }

    if line.starts_with('#') {
      continue;
    }

    if line.starts_with(' ') || line.starts_with('\t') {
      match &last_key {
        Some(key) => current.continue_value(key, line.trim()),
        None => debug!(line = %line, "continuation line without a field"),
      }
      continue;
    }

    match line.split_once(':') {
      Some((key, value)) => {
        let key = key.trim().to_string();
        current.insert(key.clone(), value.trim());
        last_key = Some(key);
      }
      None => debug!(line = %line, "skipping line without a field name"),
    }
  }

  if !current.is_empty() {
    paragraphs.push(current);
  }

  paragraphs
}

/// Reads a manifest and interprets every paragraph in it.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
  let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  let entries: Vec<_> = parse_paragraphs(&text)
    .iter()
    .filter_map(ManifestEntry::from_paragraph)
    .collect();

  debug!(path = %path.display(), entries = entries.len(), "manifest read");
  Ok(entries)
}

/// Lists the `.info` manifests in `dir`, sorted by name.
///
/// A missing directory holds no manifests.
pub fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
  if !dir.exists() {
    warn!(path = %dir.display(), "manifest directory does not exist");
    return Ok(Vec::new());
  }

  let mut files = Vec::new();
  for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|source| ManifestError::List {
      path: dir.to_path_buf(),
      source,
    })?;

    let is_manifest = entry.file_name().to_string_lossy().ends_with(MANIFEST_SUFFIX);
    if is_manifest && !entry.file_type().is_dir() {
      files.push(entry.into_path());
    }
  }

  Ok(files)
}
