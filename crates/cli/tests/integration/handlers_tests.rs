//! `confreg handlers` output.

use predicates::prelude::*;
use serde_json::Value;

use super::common::TestEnv;

fn indexed_env() -> TestEnv {
  let env = TestEnv::new();
  env.manifest(
    "base",
    "Type: file\nFile: etc/hosts\nVariables: dns/.*\n\nType: script\nScript: restart.sh\nVariables: hostname\n",
  );
  env.template("etc/hosts", "127.0.1.1 @%@hostname@%@\n");
  env.manifest(
    "ssh",
    "Type: subfile\nMultifile: etc/hosts.allow\nSubfile: etc/hosts.allow.d/10-ssh\n",
  );
  env.confreg_cmd().arg("update").assert().success();
  env
}

#[test]
fn text_listing_groups_handlers_by_pattern() {
  let env = indexed_env();

  env
    .confreg_cmd()
    .arg("handlers")
    .assert()
    .success()
    .stdout(predicate::str::contains("dns/.*"))
    .stdout(predicate::str::contains("file:/etc/hosts"))
    .stdout(predicate::str::contains("script:restart.sh"))
    .stdout(predicate::str::contains("etc/hosts.allow.d/10-ssh (for etc/hosts.allow)"))
    .stdout(predicate::str::contains("Handlers: 2"));
}

#[test]
fn json_listing_is_machine_readable() {
  let env = indexed_env();

  let output = env.confreg_cmd().args(["handlers", "--json"]).output().unwrap();
  assert!(output.status.success());

  let listing: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(
    listing["patterns"]["hostname"],
    serde_json::json!(["file:/etc/hosts", "script:restart.sh"])
  );
  assert_eq!(listing["handlers"].as_array().unwrap().len(), 2);
  assert_eq!(listing["pending"]["etc/hosts.allow"][0], "etc/hosts.allow.d/10-ssh");
}

#[test]
fn listing_never_rebuilds() {
  let env = TestEnv::new();
  env.manifest("base", "Type: file\nFile: etc/motd\n");

  env
    .confreg_cmd()
    .arg("handlers")
    .assert()
    .failure()
    .stderr(predicate::str::contains("run 'confreg update'"));

  assert!(env.divert_calls().is_empty());
}
