//! Manifest entry types.
//!
//! A [`Paragraph`] is the raw `Key: value` form of one manifest paragraph;
//! [`ManifestEntry`] is its typed interpretation, selected by `Type`.
//!
//! # Example
//!
//! ```text
//! Type: multifile
//! Multifile: etc/hosts.allow
//! User: root
//! Mode: 0644
//!
//! Type: subfile
//! Multifile: etc/hosts.allow
//! Subfile: etc/hosts.allow.d/10-sshd
//! Variables: sshd/allow
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One manifest paragraph: field name to every value given for it.
///
/// Repeated fields accumulate values in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
  fields: BTreeMap<String, Vec<String>>,
}

impl Paragraph {
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.fields.entry(key.into()).or_default().push(value.into());
  }

  /// Appends a continuation line to the last value of `key`.
  pub(crate) fn continue_value(&mut self, key: &str, line: &str) {
    if let Some(last) = self.fields.get_mut(key).and_then(|values| values.last_mut()) {
      last.push('\n');
      last.push_str(line);
    }
  }

  /// First value of `key`, if present and not blank.
  pub fn first(&self, key: &str) -> Option<&str> {
    self
      .fields
      .get(key)
      .and_then(|values| values.first())
      .map(|value| value.trim())
      .filter(|value| !value.is_empty())
  }

  pub fn all(&self, key: &str) -> &[String] {
    self.fields.get(key).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  /// Every pattern listed under `Variables`, one per line.
  pub fn variables(&self) -> BTreeSet<String> {
    self
      .all("Variables")
      .iter()
      .flat_map(|value| value.lines())
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect()
  }
}

/// Ownership and permission overrides for a generated file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
  pub user: Option<String>,
  pub group: Option<String>,
  pub mode: Option<u32>,
}

impl Ownership {
  fn from_paragraph(paragraph: &Paragraph) -> Self {
    let mode = paragraph.first("Mode").and_then(|mode| {
      let digits = mode.strip_prefix("0o").unwrap_or(mode);
      match u32::from_str_radix(digits, 8) {
        Ok(mode) if mode <= 0o7777 => Some(mode),
        _ => {
          warn!(mode = %mode, "ignoring invalid file mode");
          None
        }
      }
    });

    Self {
      user: paragraph.first("User").map(str::to_string),
      group: paragraph.first("Group").map(str::to_string),
      mode,
    }
  }

  /// Takes every override `other` sets.
  pub fn merge(&mut self, other: &Ownership) {
    if other.user.is_some() {
      self.user.clone_from(&other.user);
    }
    if other.group.is_some() {
      self.group.clone_from(&other.group);
    }
    if other.mode.is_some() {
      self.mode = other.mode;
    }
  }

  pub fn is_empty(&self) -> bool {
    self.user.is_none() && self.group.is_none() && self.mode.is_none()
  }
}

/// Modules run before and after a file is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hooks {
  pub preinst: Option<String>,
  pub postinst: Option<String>,
}

impl Hooks {
  fn from_paragraph(paragraph: &Paragraph) -> Self {
    Self {
      preinst: paragraph.first("Preinst").map(str::to_string),
      postinst: paragraph.first("Postinst").map(str::to_string),
    }
  }

  pub fn merge(&mut self, other: &Hooks) {
    if other.preinst.is_some() {
      self.preinst.clone_from(&other.preinst);
    }
    if other.postinst.is_some() {
      self.postinst.clone_from(&other.postinst);
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
  /// Template path relative to the files directory; also the destination.
  pub file: String,
  pub variables: BTreeSet<String>,
  pub hooks: Hooks,
  pub ownership: Ownership,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultifileEntry {
  pub multifile: String,
  pub variables: BTreeSet<String>,
  pub hooks: Hooks,
  pub ownership: Ownership,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubfileEntry {
  pub multifile: String,
  pub subfile: String,
  pub variables: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
  pub script: String,
  pub variables: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
  pub module: String,
  pub variables: BTreeSet<String>,
}

/// A typed manifest paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
  File(FileEntry),
  Multifile(MultifileEntry),
  Subfile(SubfileEntry),
  Script(ScriptEntry),
  Module(ModuleEntry),
}

impl ManifestEntry {
  /// Interprets a paragraph by its `Type`.
  ///
  /// Paragraphs missing a field their type requires describe nothing and
  /// yield `None`; so do unknown types.
  pub fn from_paragraph(paragraph: &Paragraph) -> Option<Self> {
    let kind = paragraph.first("Type")?;
    let variables = paragraph.variables();

    let entry = match kind {
      "file" => ManifestEntry::File(FileEntry {
        file: paragraph.first("File")?.to_string(),
        variables,
        hooks: Hooks::from_paragraph(paragraph),
        ownership: Ownership::from_paragraph(paragraph),
      }),
      "multifile" => ManifestEntry::Multifile(MultifileEntry {
        multifile: paragraph.first("Multifile")?.to_string(),
        variables,
        hooks: Hooks::from_paragraph(paragraph),
        ownership: Ownership::from_paragraph(paragraph),
      }),
      "subfile" => ManifestEntry::Subfile(SubfileEntry {
        multifile: paragraph.first("Multifile")?.to_string(),
        subfile: paragraph.first("Subfile")?.to_string(),
        variables,
      }),
      "script" if !variables.is_empty() => ManifestEntry::Script(ScriptEntry {
        script: paragraph.first("Script")?.to_string(),
        variables,
      }),
      "module" if !variables.is_empty() => ManifestEntry::Module(ModuleEntry {
        module: paragraph.first("Module")?.to_string(),
        variables,
      }),
      "script" | "module" => return None,
      other => {
        warn!(kind = %other, "ignoring manifest paragraph of unknown type");
        return None;
      }
    };

    Some(entry)
  }
}
