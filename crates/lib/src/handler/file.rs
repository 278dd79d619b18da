use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::generate::{Target, generate, read_template};
use super::{HandlerError, InvokeContext, destination_of};
use crate::manifest::{Hooks, Ownership};
use crate::registry::ChangeSet;
use crate::template::{self, RenderContext};

/// Renders a single template to a single destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandler {
  /// Template path relative to the files directory.
  pub source: String,
  /// Host-absolute destination.
  pub destination: String,
  pub variables: BTreeSet<String>,
  #[serde(default)]
  pub hooks: Hooks,
  #[serde(default)]
  pub ownership: Ownership,
}

impl FileHandler {
  /// Handler for a manifest `File:` path; template and destination share it.
  pub fn new(file: &str) -> Self {
    Self {
      source: file.trim_start_matches('/').to_string(),
      destination: destination_of(file),
      variables: BTreeSet::new(),
      hooks: Hooks::default(),
      ownership: Ownership::default(),
    }
  }

  pub(crate) fn invoke(&self, ctx: &InvokeContext<'_>, changes: &ChangeSet) -> Result<(), HandlerError> {
    let template_path = ctx.config.template_path(&self.source);
    let text = read_template(&template_path)?.ok_or_else(|| HandlerError::MissingTemplate {
      path: template_path.clone(),
    })?;

    let sources = [template_path.display().to_string()];
    let target = Target {
      destination: &self.destination,
      hooks: &self.hooks,
      ownership: &self.ownership,
      dummy: template_path.clone(),
    };

    generate(&target, ctx, changes, || {
      let render_ctx = RenderContext {
        registry: ctx.registry,
        exec: &ctx.config.exec,
        sources: &sources,
      };
      template::render(&text, &render_ctx).map_err(|source| HandlerError::Render {
        path: template_path.clone(),
        source,
      })
    })
  }
}
