//! update / register / unregister / trigger / commit against a temp root.

use predicates::prelude::*;

use super::common::TestEnv;

fn motd_env() -> TestEnv {
  let env = TestEnv::new();
  env.manifest("motd", "Type: file\nFile: etc/motd\n");
  env.template("etc/motd", "Welcome to @%@hostname@%@\n");
  env.registry("hostname: alpha\n");
  env
}

#[test]
fn update_builds_index_and_diverts() {
  let env = motd_env();

  env
    .confreg_cmd()
    .arg("update")
    .assert()
    .success()
    .stdout(predicate::str::contains("Handler index rebuilt"))
    .stdout(predicate::str::contains("Handlers: 1"));

  assert!(env.path("var/cache/confreg/handlers.cache").is_file());
  assert_eq!(env.divert_calls(), vec!["--add /etc/motd"]);
  assert!(env.is_diverted("/etc/motd"));
}

#[test]
fn second_update_leaves_diversions_alone() {
  let env = motd_env();

  env.confreg_cmd().arg("update").assert().success();
  env.confreg_cmd().arg("update").assert().success();

  assert_eq!(env.divert_calls().len(), 1);
}

#[test]
fn register_generates_file() {
  let env = motd_env();
  env.write_file("etc/motd", "packaged motd\n");

  env
    .confreg_cmd()
    .args(["register", "motd"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Registered motd (1 handler)"))
    .stdout(predicate::str::contains("file:/etc/motd"));

  assert_eq!(env.read_file("etc/motd").as_deref(), Some("Welcome to alpha\n"));
  assert_eq!(env.read_file("etc/motd.debian").as_deref(), Some("packaged motd\n"));
}

#[test]
fn register_lists_handlers_that_failed_to_generate() {
  let env = motd_env();
  env.manifest("motd", "Type: file\nFile: etc/motd\n\nType: file\nFile: etc/issue\n");

  env
    .confreg_cmd()
    .args(["register", "motd"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Registered motd (2 handlers)"))
    .stderr(predicate::str::contains("file:/etc/issue"));

  assert_eq!(env.read_file("etc/motd").as_deref(), Some("Welcome to alpha\n"));
  assert_eq!(env.read_file("etc/issue"), None);
}

#[test]
fn register_unknown_package_fails() {
  let env = motd_env();

  env
    .confreg_cmd()
    .args(["register", "absent"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to register absent"));
}

#[test]
fn trigger_picks_up_new_values() {
  let env = motd_env();
  env.confreg_cmd().args(["register", "motd"]).assert().success();

  env.registry("hostname: beta\n");
  env
    .confreg_cmd()
    .args(["trigger", "hostname"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Ran 1 handler"));

  assert_eq!(env.read_file("etc/motd").as_deref(), Some("Welcome to beta\n"));
}

#[test]
fn trigger_of_unrelated_key_runs_nothing() {
  let env = motd_env();
  env.confreg_cmd().arg("update").assert().success();

  env
    .confreg_cmd()
    .args(["trigger", "domainname"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No handlers matched"));

  assert!(env.read_file("etc/motd").is_none());
}

#[test]
fn commit_regenerates_only_named_files() {
  let env = motd_env();
  env.manifest("hosts", "Type: file\nFile: etc/hostname\n");
  env.template("etc/hostname", "@%@hostname@%@\n");
  env.confreg_cmd().arg("update").assert().success();

  env.confreg_cmd().args(["commit", "/etc/hostname"]).assert().success();
  assert_eq!(env.read_file("etc/hostname").as_deref(), Some("alpha\n"));
  assert!(env.read_file("etc/motd").is_none());

  env
    .confreg_cmd()
    .arg("commit")
    .assert()
    .success()
    .stdout(predicate::str::contains("Ran 2 handlers"));
  assert_eq!(env.read_file("etc/motd").as_deref(), Some("Welcome to alpha\n"));
}

#[test]
fn commit_reports_missing_template_but_succeeds() {
  let env = motd_env();
  env.manifest("broken", "Type: file\nFile: etc/issue\n");
  env.confreg_cmd().arg("update").assert().success();

  env
    .confreg_cmd()
    .arg("commit")
    .assert()
    .success()
    .stderr(predicate::str::contains("file:/etc/issue"));
  assert_eq!(env.read_file("etc/motd").as_deref(), Some("Welcome to alpha\n"));
}

#[test]
fn unregister_removes_file_and_diversion() {
  let env = motd_env();
  env.write_file("etc/motd", "packaged motd\n");
  env.confreg_cmd().args(["register", "motd"]).assert().success();

  env
    .confreg_cmd()
    .args(["unregister", "motd"])
    .assert()
    .success()
    .stdout(predicate::str::contains("1 handler removed"));

  assert!(!env.is_diverted("/etc/motd"));
  assert!(!env.path("var/cache/confreg/handlers.cache").exists());
  // dpkg-divert --rename puts the packaged file back.
  assert_eq!(env.read_file("etc/motd").as_deref(), Some("packaged motd\n"));
}

#[test]
fn registry_flag_overrides_default_file() {
  let env = motd_env();
  env.write_file("alt.conf", "hostname: gamma\n");

  env
    .confreg_cmd()
    .arg("--registry")
    .arg(env.path("alt.conf"))
    .args(["register", "motd"])
    .assert()
    .success();

  assert_eq!(env.read_file("etc/motd").as_deref(), Some("Welcome to gamma\n"));
}

#[test]
fn registry_env_var_overrides_default_file() {
  let env = motd_env();
  env.write_file("alt.conf", "hostname: delta\n");

  env
    .confreg_cmd()
    .env("CONFREG_REGISTRY", env.path("alt.conf"))
    .args(["register", "motd"])
    .assert()
    .success();

  assert_eq!(env.read_file("etc/motd").as_deref(), Some("Welcome to delta\n"));
}

#[test]
fn verbose_logs_engine_progress() {
  let env = motd_env();

  env
    .confreg_cmd()
    .args(["-v", "update"])
    .assert()
    .success()
    .stderr(predicate::str::contains("rebuilt handler index"));
}
