//! Shared fixtures for engine tests.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use confreg_lib::config::{EngineConfig, ExecConfig};
use confreg_lib::diversion::{Diversion, DiversionError, Diverter};
use confreg_lib::engine::Engine;
use confreg_lib::handler::ModuleTable;
use tempfile::TempDir;

/// Diversion store kept in memory; every add/remove is logged.
#[derive(Clone, Default)]
pub struct RecordingDiverter {
  pub diverted: Rc<RefCell<Vec<String>>>,
  pub calls: Rc<RefCell<Vec<String>>>,
}

impl RecordingDiverter {
  pub fn is_diverted(&self, path: &str) -> bool {
    self.diverted.borrow().iter().any(|p| p == path)
  }

  pub fn call_count(&self) -> usize {
    self.calls.borrow().len()
  }
}

impl Diverter for RecordingDiverter {
  fn diversions(&self) -> Result<Vec<Diversion>, DiversionError> {
    Ok(
      self
        .diverted
        .borrow()
        .iter()
        .map(|path| Diversion {
          from: path.clone(),
          to: format!("{path}.debian"),
          owner: ":".to_string(),
        })
        .collect(),
    )
  }

  fn add(&mut self, path: &str) -> Result<(), DiversionError> {
    self.calls.borrow_mut().push(format!("add {path}"));
    self.diverted.borrow_mut().push(path.to_string());
    Ok(())
  }

  fn remove(&mut self, path: &str) -> Result<(), DiversionError> {
    self.calls.borrow_mut().push(format!("remove {path}"));
    self.diverted.borrow_mut().retain(|p| p != path);
    Ok(())
  }
}

/// Relocated root holding manifests, templates and outputs.
pub struct TestRoot {
  pub temp: TempDir,
  pub config: EngineConfig,
  pub diverter: RecordingDiverter,
}

impl TestRoot {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let mut config = EngineConfig::with_root(temp.path());
    config.exec = ExecConfig::shell();
    Self {
      temp,
      config,
      diverter: RecordingDiverter::default(),
    }
  }

  pub fn engine(&self) -> Engine {
    Engine::new(self.config.clone(), Box::new(self.diverter.clone()), ModuleTable::new())
  }

  pub fn manifest(&self, package: &str, content: &str) {
    write(self.config.manifest_path(package), content);
  }

  pub fn template(&self, relative: &str, content: &str) {
    write(self.config.template_path(relative), content);
  }

  pub fn script(&self, relative: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = self.config.script_path(relative);
    write(path.clone(), &format!("#!/bin/sh\n{body}\n"));
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  }

  /// Content of a generated destination, if it exists.
  pub fn output(&self, destination: &str) -> Option<String> {
    fs::read_to_string(self.config.destination(destination)).ok()
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }
}

fn write(path: PathBuf, content: &str) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, content).unwrap();
}
