//! Dependency index construction and its cache.

use std::fs;

use confreg_lib::cache::{self, MAX_VERSION};
use confreg_lib::handler::Handler;
use confreg_lib::index::HandlerState;

use super::common::TestRoot;

fn sample_root() -> TestRoot {
  let root = TestRoot::new();
  root.manifest(
    "base",
    "Type: file\nFile: etc/hosts\nVariables: dns/.*\n\n\
     Type: multifile\nMultifile: etc/hosts.allow\nVariables: hosts/allow\n\n\
     Type: script\nScript: restart-bind9\nVariables: dns/forwarder.*\n",
  );
  root.manifest(
    "ssh",
    "Type: subfile\nMultifile: etc/hosts.allow\nSubfile: etc/hosts.allow.d/10-ssh\nVariables: sshd/allow\n\n\
     Type: module\nModule: sshd.py\nVariables: sshd/port\n\tsshd/permitroot\n",
  );
  fs::write(root.config.manifest_dir.join("README"), "Type: file\nFile: etc/never\n").unwrap();
  root.template("etc/hosts", "127.0.0.1 @%@hostname@%@.@%@domainname@%@\n");
  root
}

#[test]
fn every_handler_is_listed_under_each_of_its_variables() {
  let root = sample_root();
  let mut engine = root.engine();
  engine.update().unwrap();

  let index = engine.index();
  assert_eq!(index.len(), 4);
  for handler in index.handlers() {
    for variable in handler.variables() {
      assert!(
        index.patterns()[&variable].contains(&handler.id()),
        "{} missing under {variable}",
        handler.id()
      );
    }
  }
  assert!(index.handlers().all(|h| h.destination() != Some("/etc/never")));
}

#[test]
fn update_twice_produces_identical_state_and_cache() {
  let root = sample_root();
  let mut engine = root.engine();

  engine.update().unwrap();
  let first_state = engine.state().clone();
  let first_bytes = fs::read(&root.config.cache_file).unwrap();

  engine.update().unwrap();
  assert_eq!(engine.state(), &first_state);
  assert_eq!(fs::read(&root.config.cache_file).unwrap(), first_bytes);
}

#[test]
fn load_after_update_restores_the_same_index() {
  let root = sample_root();
  let mut built = root.engine();
  built.update().unwrap();

  let mut loaded = root.engine();
  loaded.load().unwrap();

  assert_eq!(loaded.index(), built.index());
  assert_eq!(loaded.state(), built.state());
}

#[test]
fn cache_from_a_newer_format_is_ignored() {
  let root = sample_root();

  // A well-formed but empty cache stamped with an unsupported version.
  let bytes = cache::encode(&HandlerState::default()).unwrap();
  let text = String::from_utf8(bytes).unwrap();
  let future = text.replacen("version 1\n", &format!("version {}\n", MAX_VERSION + 1), 1);
  fs::create_dir_all(root.config.cache_file.parent().unwrap()).unwrap();
  fs::write(&root.config.cache_file, future).unwrap();

  let mut engine = root.engine();
  engine.load().unwrap();

  assert_eq!(engine.index().len(), 4);
  let rewritten = fs::read_to_string(&root.config.cache_file).unwrap();
  assert!(rewritten.starts_with("confreg handler cache, version 1\n"));
}

#[test]
fn corrupt_cache_triggers_rebuild() {
  let root = sample_root();
  fs::create_dir_all(root.config.cache_file.parent().unwrap()).unwrap();
  fs::write(&root.config.cache_file, "confreg handler cache, version 1\n9999\n{").unwrap();

  let mut engine = root.engine();
  engine.load().unwrap();

  assert_eq!(engine.index().len(), 4);
}

#[test]
fn subfile_before_multifile_is_attached_once_declared() {
  let root = TestRoot::new();
  // Manifests are read in name order, so "a-" declares the subfile first.
  root.manifest(
    "a-ssh",
    "Type: subfile\nMultifile: etc/hosts.allow\nSubfile: etc/hosts.allow.d/10-ssh\nVariables: sshd/allow\n",
  );
  root.template("etc/hosts.allow.d/10-ssh", "sshd: @%@sshd/clients@%@\n");
  root.manifest("b-base", "Type: multifile\nMultifile: etc/hosts.allow\nVariables: hosts/allow\n");

  let mut engine = root.engine();
  engine.update().unwrap();

  assert!(engine.state().pending.is_empty());
  let Some(Handler::Multifile(multi)) = engine.index().handlers().next() else {
    panic!("expected a single multifile handler");
  };
  assert_eq!(
    multi.all_variables().into_iter().collect::<Vec<_>>(),
    vec!["hosts/allow", "sshd/allow", "sshd/clients"]
  );
}

#[test]
fn dangling_subfile_stays_pending_in_cache() {
  let root = TestRoot::new();
  root.manifest(
    "ssh",
    "Type: subfile\nMultifile: etc/hosts.allow\nSubfile: etc/hosts.allow.d/10-ssh\n",
  );

  let mut engine = root.engine();
  engine.update().unwrap();
  assert!(engine.index().is_empty());
  assert_eq!(engine.state().pending["etc/hosts.allow"].len(), 1);

  let reloaded = cache::load(&root.config.cache_file).unwrap();
  assert_eq!(&reloaded, engine.state());
}
