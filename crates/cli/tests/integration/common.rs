//! Shared test helpers for CLI integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Stand-in for `dpkg-divert`.
///
/// Keeps the diversion record in the `path / divert-to / owner` format the
/// engine reads, renames files like `--rename` does and logs every call.
const DIVERT_STUB: &str = r#"#!/bin/sh
root=/
while [ $# -gt 0 ]; do
  case "$1" in
    --root) root=$2; shift 2 ;;
    --divert) shift 2 ;;
    --add|--remove) op=$1; path=$2; shift 2 ;;
    *) shift ;;
  esac
done
db="$root/var/lib/dpkg/diversions"
mkdir -p "$(dirname "$db")"
touch "$db"
echo "$op $path" >> "$root/divert.log"
if [ "$op" = --add ]; then
  if [ -e "$root$path" ]; then mv "$root$path" "$root$path.debian"; fi
  printf '%s\n%s.debian\n:\n' "$path" "$path" >> "$db"
else
  if [ -e "$root$path.debian" ]; then mv "$root$path.debian" "$root$path"; fi
  awk -v p="$path" 'NR % 3 == 1 { skip = ($0 == p) } !skip' "$db" > "$db.new" && mv "$db.new" "$db"
fi
"#;

/// Isolated root for one test.
///
/// Every managed path, the registry file and the diversion record live
/// below the temp directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_file("bin/dpkg-divert", DIVERT_STUB);
    let stub = env.path("bin/dpkg-divert");
    std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
    env
  }

  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap_or_else(|_| self.temp.path().to_path_buf())
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root().join(relative)
  }

  /// Write a file relative to the root.
  pub fn write_file(&self, relative: &str, content: &str) {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative: &str) -> Option<String> {
    std::fs::read_to_string(self.path(relative)).ok()
  }

  pub fn manifest(&self, package: &str, content: &str) {
    self.write_file(&format!("etc/confreg/templates/info/{package}.info"), content);
  }

  pub fn template(&self, relative: &str, content: &str) {
    self.write_file(&format!("etc/confreg/templates/files/{relative}"), content);
  }

  /// Replaces the default registry file.
  pub fn registry(&self, content: &str) {
    self.write_file("etc/confreg/base.conf", content);
  }

  /// Calls made to the diversion stub, e.g. `--add /etc/motd`.
  pub fn divert_calls(&self) -> Vec<String> {
    self
      .read_file("divert.log")
      .map(|log| log.lines().map(String::from).collect())
      .unwrap_or_default()
  }

  pub fn is_diverted(&self, path: &str) -> bool {
    self
      .read_file("var/lib/dpkg/diversions")
      .is_some_and(|db| db.lines().step_by(3).any(|line| line == path))
  }

  /// A Command for the confreg binary confined to this root.
  pub fn confreg_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("confreg");
    cmd.env("CONFREG_ROOT", self.root());
    cmd.env("CONFREG_DIVERT_PROGRAM", self.path("bin/dpkg-divert"));
    cmd.env_remove("CONFREG_REGISTRY");
    cmd.env_remove("CONFREG_LOG");
    cmd
  }
}
