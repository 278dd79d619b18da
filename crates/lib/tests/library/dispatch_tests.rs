//! Change dispatch and commit.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use confreg_lib::handler::{HandlerId, HandlerKind};
use confreg_lib::registry::{ChangeSet, MemoryRegistry};

use super::common::TestRoot;

fn changed(key: &str, old: &str, new: &str) -> ChangeSet {
  ChangeSet::from([(key.to_string(), (Some(old.to_string()), Some(new.to_string())))])
}

#[test]
fn overlapping_patterns_invoke_each_handler_once() {
  let root = TestRoot::new();
  let log = root.path("calls");
  root.manifest(
    "pkg",
    "Type: script\nScript: one.sh\nVariables: foo/.*\n\n\
     Type: script\nScript: two.sh\nVariables: foo/bar\n\tfoo/b.*\n\n\
     Type: script\nScript: three.sh\nVariables: baz\n",
  );
  for name in ["one.sh", "two.sh", "three.sh"] {
    root.script(name, &format!("echo {name} >> {}", log.display()));
  }

  let mut engine = root.engine();
  engine.update().unwrap();
  let report = engine.dispatch(&MemoryRegistry::new(), &changed("foo/bar", "1", "2"));

  let invoked: BTreeSet<HandlerId> = report.invoked.iter().cloned().collect();
  assert_eq!(
    invoked,
    BTreeSet::from([
      HandlerId::new(HandlerKind::Script, "one.sh"),
      HandlerId::new(HandlerKind::Script, "two.sh"),
    ])
  );
  assert_eq!(report.invoked.len(), 2);

  let mut calls: Vec<String> = fs::read_to_string(&log).unwrap().lines().map(String::from).collect();
  calls.sort();
  assert_eq!(calls, vec!["one.sh", "two.sh"]);
}

#[test]
fn failing_handler_does_not_stop_the_batch() {
  let root = TestRoot::new();
  root.manifest(
    "pkg",
    "Type: file\nFile: etc/absent\nVariables: hostname\n\n\
     Type: file\nFile: etc/hostname\nVariables: hostname\n",
  );
  root.template("etc/hostname", "@%@hostname@%@\n");

  let mut engine = root.engine();
  engine.update().unwrap();
  let registry: MemoryRegistry = [("hostname", "gamma")].into_iter().collect();
  let report = engine.dispatch(&registry, &changed("hostname", "beta", "gamma"));

  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].0, HandlerId::new(HandlerKind::File, "/etc/absent"));
  assert_eq!(root.output("/etc/hostname").as_deref(), Some("gamma\n"));
}

#[test]
fn script_receives_only_real_changes() {
  let root = TestRoot::new();
  let out = root.path("stdin");
  root.manifest("pkg", "Type: script\nScript: bind9.sh\nVariables: dns/.*\n");
  root.script("bind9.sh", &format!("echo \"$1\" > {0}; cat >> {0}", out.display()));

  let mut engine = root.engine();
  engine.update().unwrap();
  let mut changes = changed("dns/forwarder1", "1.1.1.1", "9.9.9.9");
  changes.insert("dns/forwarder2".into(), (None, Some("8.8.8.8".into())));
  engine.dispatch(&MemoryRegistry::new(), &changes);

  assert_eq!(
    fs::read_to_string(out).unwrap(),
    "generate\ndns/forwarder1@%@1.1.1.1@%@9.9.9.9\n"
  );
}

#[test]
fn commit_regenerates_requested_destinations() {
  let root = TestRoot::new();
  root.manifest(
    "pkg",
    "Type: file\nFile: etc/a\n\nType: file\nFile: etc/b\n\nType: script\nScript: s.sh\nVariables: x\n",
  );
  root.template("etc/a", "A=@%@a@%@\n");
  root.template("etc/b", "B=@%@b@%@\n");

  let mut engine = root.engine();
  engine.update().unwrap();
  let registry: MemoryRegistry = [("a", "1"), ("b", "2")].into_iter().collect();

  let report = engine.commit(&registry, &[PathBuf::from("/etc/b"), PathBuf::from("/etc/unknown")]);
  assert_eq!(report.invoked, vec![HandlerId::new(HandlerKind::File, "/etc/b")]);
  assert_eq!(root.output("/etc/b").as_deref(), Some("B=2\n"));
  assert!(root.output("/etc/a").is_none());

  let report = engine.commit(&registry, &[]);
  assert_eq!(report.invoked.len(), 3);
  assert_eq!(root.output("/etc/a").as_deref(), Some("A=1\n"));
}
