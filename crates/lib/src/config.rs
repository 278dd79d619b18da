//! Engine configuration.
//!
//! [`EngineConfig`] gathers every location and external program the engine
//! touches. It is built from [`crate::paths`] defaults, so relocating the
//! root relocates everything at once.

use std::path::{Path, PathBuf};

use crate::consts::{DIVERT_PROGRAM_ENV, MANIFEST_SUFFIX};
use crate::paths;

/// Binds the registry snapshot to the names templates expect.
const PYTHON_PRELUDE: &str = "\
import json as _json
import os as _os
with open(_os.environ['CONFIG_REGISTRY']) as _fd:
    configRegistry = _json.load(_fd)
baseConfig = configRegistry
";

/// How `@!@code@!@` blocks are executed.
///
/// The prelude followed by the code is fed to `program args...` on stdin;
/// whatever the process prints on stdout replaces the block. With `enabled`
/// unset, blocks are left in the output untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
  pub enabled: bool,
  pub program: String,
  pub args: Vec<String>,
  pub prelude: String,
}

impl ExecConfig {
  /// Executes blocks as POSIX shell, without a prelude.
  pub fn shell() -> Self {
    Self {
      enabled: true,
      program: "/bin/sh".to_string(),
      args: vec!["-s".to_string()],
      prelude: String::new(),
    }
  }
}

impl Default for ExecConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      program: "python3".to_string(),
      args: vec!["-".to_string()],
      prelude: PYTHON_PRELUDE.to_string(),
    }
  }
}

/// Locations and programs used by the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Prefix every destination is written below.
  pub root: PathBuf,
  pub manifest_dir: PathBuf,
  pub files_dir: PathBuf,
  pub scripts_dir: PathBuf,
  pub cache_file: PathBuf,
  pub diversions_file: PathBuf,
  /// Diversion tool, `dpkg-divert` unless overridden.
  pub divert_program: String,
  pub exec: ExecConfig,
}

impl EngineConfig {
  /// Configuration for the root selected by the environment.
  pub fn from_env() -> Self {
    let mut config = Self::with_root(paths::root_dir());
    if let Ok(program) = std::env::var(DIVERT_PROGRAM_ENV)
      && !program.is_empty()
    {
      config.divert_program = program;
    }
    config
  }

  /// Configuration with every default path placed below `root`.
  pub fn with_root(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      manifest_dir: paths::manifest_dir(&root),
      files_dir: paths::files_dir(&root),
      scripts_dir: paths::scripts_dir(&root),
      cache_file: paths::cache_file(&root),
      diversions_file: paths::diversions_file(&root),
      divert_program: "dpkg-divert".to_string(),
      exec: ExecConfig::default(),
      root,
    }
  }

  /// Physical location of a host-absolute destination such as `/etc/hosts`.
  pub fn destination(&self, path: &str) -> PathBuf {
    paths::under_root(&self.root, path)
  }

  /// Manifest belonging to `package`.
  pub fn manifest_path(&self, package: &str) -> PathBuf {
    self.manifest_dir.join(format!("{package}{MANIFEST_SUFFIX}"))
  }

  /// Template (or multifile dummy) for a path relative to the files directory.
  pub fn template_path(&self, relative: &str) -> PathBuf {
    self.files_dir.join(relative.trim_start_matches('/'))
  }

  /// Script mirroring a destination, or named by a script handler.
  pub fn script_path(&self, relative: &str) -> PathBuf {
    self.scripts_dir.join(relative.trim_start_matches('/'))
  }

  pub fn is_system_root(&self) -> bool {
    self.root == Path::new("/")
  }
}
