use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::generate::{Target, generate, read_template};
use super::{HandlerError, InvokeContext, destination_of};
use crate::manifest::{Hooks, Ownership};
use crate::registry::ChangeSet;
use crate::template::{self, RenderContext};

/// A subfile contribution waiting for, or attached to, a multifile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfile {
  /// Template path relative to the files directory.
  pub path: String,
  pub variables: BTreeSet<String>,
}

/// Assembles one destination from the rendered text of its subfiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultifileHandler {
  /// Manifest `Multifile:` path; also names the dummy template.
  pub name: String,
  pub destination: String,
  /// Variables declared on the multifile itself.
  pub variables: BTreeSet<String>,
  /// Subfile template path to the variables it contributes.
  pub subfiles: BTreeMap<String, BTreeSet<String>>,
  /// Number of manifests currently declaring this multifile.
  pub def_count: u32,
  #[serde(default)]
  pub hooks: Hooks,
  #[serde(default)]
  pub ownership: Ownership,
}

impl MultifileHandler {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.trim_start_matches('/').to_string(),
      destination: destination_of(name),
      variables: BTreeSet::new(),
      subfiles: BTreeMap::new(),
      def_count: 0,
      hooks: Hooks::default(),
      ownership: Ownership::default(),
    }
  }

  /// Attaches a subfile, unioning variables if it is already attached.
  pub fn add_subfile(&mut self, path: &str, variables: BTreeSet<String>) {
    self.subfiles.entry(path.to_string()).or_default().extend(variables);
  }

  /// Detaches a subfile; returns whether it was attached.
  pub fn remove_subfile(&mut self, path: &str) -> bool {
    self.subfiles.remove(path).is_some()
  }

  /// Own variables plus those of every attached subfile.
  pub fn all_variables(&self) -> BTreeSet<String> {
    let mut all = self.variables.clone();
    for variables in self.subfiles.values() {
      all.extend(variables.iter().cloned());
    }
    all
  }

  /// Subfile paths in concatenation order: by basename, then full path.
  pub fn ordered_subfiles(&self) -> Vec<&str> {
    let mut paths: Vec<&str> = self.subfiles.keys().map(String::as_str).collect();
    paths.sort_by(|a, b| basename(a).cmp(basename(b)).then_with(|| a.cmp(b)));
    paths
  }

  pub fn needs_diversion(&self) -> bool {
    self.def_count >= 1 && !self.subfiles.is_empty()
  }

  /// No manifest declares it and no subfile is attached.
  pub fn is_orphaned(&self) -> bool {
    self.def_count == 0 && self.subfiles.is_empty()
  }

  pub(crate) fn invoke(&self, ctx: &InvokeContext<'_>, changes: &ChangeSet) -> Result<(), HandlerError> {
    if !self.needs_diversion() {
      debug!(multifile = %self.destination, "multifile not declared or empty, skipping");
      return Ok(());
    }

    let paths: Vec<_> = self
      .ordered_subfiles()
      .into_iter()
      .map(|path| ctx.config.template_path(path))
      .collect();
    let sources: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();

    let target = Target {
      destination: &self.destination,
      hooks: &self.hooks,
      ownership: &self.ownership,
      dummy: ctx.config.template_path(&self.name),
    };

    generate(&target, ctx, changes, || {
      let render_ctx = RenderContext {
        registry: ctx.registry,
        exec: &ctx.config.exec,
        sources: &sources,
      };
      let mut content = Vec::new();
      for path in &paths {
        let Some(text) = read_template(path)? else {
          warn!(subfile = %path.display(), "subfile template not found, skipping");
          continue;
        };
        let rendered = template::render(&text, &render_ctx).map_err(|source| HandlerError::Render {
          path: path.clone(),
          source,
        })?;
        content.extend_from_slice(&rendered);
      }
      Ok(content)
    })
  }
}

fn basename(path: &str) -> &str {
  Path::new(path)
    .file_name()
    .and_then(|name| name.to_str())
    .unwrap_or(path)
}
