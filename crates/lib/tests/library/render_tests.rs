//! Template output as seen on disk.

use std::collections::BTreeMap;
use std::fs;

use confreg_lib::config::ExecConfig;
use confreg_lib::registry::{MemoryRegistry, Registry};

use super::common::TestRoot;

fn render_once(root: &TestRoot, template: &str, registry: &MemoryRegistry) -> Option<String> {
  root.manifest("app", "Type: file\nFile: srv/app.conf\n");
  root.template("srv/app.conf", template);
  let mut engine = root.engine();
  engine.update().unwrap();
  let report = engine.commit(registry, &[]);
  assert!(report.failed.is_empty(), "{:?}", report.failed);
  root.output("/srv/app.conf")
}

#[test]
fn variable_renders_value_or_nothing() {
  let set: MemoryRegistry = [("k", "5")].into_iter().collect();
  assert_eq!(render_once(&TestRoot::new(), "x=@%@k@%@", &set).as_deref(), Some("x=5"));
  assert_eq!(
    render_once(&TestRoot::new(), "x=@%@k@%@", &MemoryRegistry::new()).as_deref(),
    Some("x=")
  );
}

#[test]
fn repeated_renders_leave_no_temporary_files() {
  let root = TestRoot::new();
  let mut registry: MemoryRegistry = [("port", "80")].into_iter().collect();
  render_once(&root, "Listen @%@port@%@\n", &registry);

  let mut engine = root.engine();
  engine.load().unwrap();
  for port in ["8080", "8443"] {
    let changes = registry.update(BTreeMap::from([("port".to_string(), Some(port.to_string()))]));
    assert_eq!(engine.dispatch(&registry, &changes).invoked.len(), 1);
  }

  assert_eq!(root.output("/srv/app.conf").as_deref(), Some("Listen 8443\n"));
  let names: Vec<String> = fs::read_dir(root.path("srv"))
    .unwrap()
    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  assert_eq!(names, vec!["app.conf"]);
}

#[test]
fn warning_banner_names_the_template() {
  let root = TestRoot::new();
  let out = render_once(&root, "@%@UCRWARNING=# @%@\nListen 80\n", &MemoryRegistry::new()).unwrap();

  let template = root.config.template_path("srv/app.conf");
  assert!(out.starts_with("# Warning: This file is auto-generated"));
  assert!(out.contains(&format!("# \t{}\n", template.display())));
  assert!(out.ends_with("\n# \nListen 80\n"));
}

#[test]
fn ascii_banner_has_no_umlauts() {
  let root = TestRoot::new();
  let out = render_once(&root, "@%@UCRWARNING_ASCII=; @%@\n", &MemoryRegistry::new()).unwrap();

  assert!(out.starts_with("; "));
  assert!(out.is_ascii());
}

#[test]
fn exec_blocks_see_substituted_values() {
  let root = TestRoot::new();
  let registry: MemoryRegistry = [("workers", "3")].into_iter().collect();
  let out = render_once(&root, "@!@for i in $(seq @%@workers@%@); do echo w$i; done@!@", &registry);
  assert_eq!(out.as_deref(), Some("w1\nw2\nw3\n"));
}

#[test]
fn disabled_exec_keeps_blocks_verbatim() {
  let mut root = TestRoot::new();
  root.config.exec = ExecConfig {
    enabled: false,
    ..ExecConfig::shell()
  };
  let out = render_once(&root, "@!@echo hi@!@\n", &MemoryRegistry::new());
  assert_eq!(out.as_deref(), Some("@!@echo hi@!@\n"));
}

#[test]
fn latin1_template_is_written_byte_for_byte() {
  let root = TestRoot::new();
  root.manifest("app", "Type: file\nFile: srv/app.conf\n");
  fs::create_dir_all(root.config.template_path("srv")).unwrap();
  fs::write(root.config.template_path("srv/app.conf"), b"caf\xe9 @%@k@%@\n").unwrap();
  let registry: MemoryRegistry = [("k", "1")].into_iter().collect();

  let mut engine = root.engine();
  engine.update().unwrap();
  assert!(engine.commit(&registry, &[]).failed.is_empty());

  assert_eq!(
    fs::read(root.config.destination("/srv/app.conf")).unwrap(),
    b"caf\xe9 1\n"
  );
}

#[test]
fn registry_value_cannot_inject_code() {
  let root = TestRoot::new();
  let marker = root.path("executed");
  let payload = format!("@!@touch {}@!@", marker.display());
  let registry: MemoryRegistry = [("motd", payload.as_str())].into_iter().collect();

  let out = render_once(&root, "@%@motd@%@\n", &registry);

  assert_eq!(out, Some(format!("{payload}\n")));
  assert!(!marker.exists());
}
