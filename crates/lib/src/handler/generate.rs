//! Shared write path of file and multifile handlers.
//!
//! Order of effects for one destination:
//!
//! 1. `Preinst` module
//! 2. render into a hidden temp file next to the destination
//! 3. copy owner and mode from the permission template, then apply overrides
//! 4. rename over the destination (copy fallback on `EBUSY`)
//! 5. `Postinst` module, then the mirrored script with mode `postinst`

use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Group, Uid, User, chown};
use tracing::{debug, info, warn};

use super::module::ModuleMode;
use super::script::run_script;
use super::{HandlerError, InvokeContext};
use crate::manifest::{Hooks, Ownership};
use crate::registry::ChangeSet;
use crate::util::fs::{persist, temp_sibling};

/// Destination plus the per-file settings that govern how it is written.
pub(crate) struct Target<'a> {
  /// Host-absolute destination path.
  pub destination: &'a str,
  pub hooks: &'a Hooks,
  pub ownership: &'a Ownership,
  /// File whose owner and mode the output inherits, when it exists.
  pub dummy: PathBuf,
}

/// Reads a template's raw bytes, `None` when it does not exist.
pub(crate) fn read_template(path: &Path) -> Result<Option<Vec<u8>>, HandlerError> {
  match fs::read(path) {
    Ok(bytes) => Ok(Some(bytes)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(source) => Err(HandlerError::ReadTemplate {
      path: path.to_path_buf(),
      source,
    }),
  }
}

pub(crate) fn generate<F>(
  target: &Target<'_>,
  ctx: &InvokeContext<'_>,
  changes: &ChangeSet,
  render: F,
) -> Result<(), HandlerError>
where
  F: FnOnce() -> Result<Vec<u8>, HandlerError>,
{
  let dest = ctx.config.destination(target.destination);

  if let Some(module) = &target.hooks.preinst
    && let Err(e) = ctx.modules.call(module, ModuleMode::Preinst, ctx.registry, changes)
  {
    warn!(module = %module, error = %e, "preinst module failed");
  }

  let write_err = |source: io::Error| HandlerError::Write {
    path: dest.clone(),
    source,
  };

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(write_err)?;
  }

  let template = permission_template(&target.dummy, &dest);
  let content = render()?;

  let mut tmp = temp_sibling(&dest).map_err(write_err)?;
  tmp.write_all(&content).map_err(write_err)?;
  tmp.as_file().sync_all().map_err(write_err)?;

  apply_permissions(tmp.path(), template.as_ref(), target.ownership)?;
  persist(tmp, &dest).map_err(write_err)?;
  info!(path = %dest.display(), bytes = content.len(), "generated file");

  if let Some(module) = &target.hooks.postinst
    && let Err(e) = ctx.modules.call(module, ModuleMode::Postinst, ctx.registry, changes)
  {
    warn!(module = %module, error = %e, "postinst module failed");
  }

  let script = ctx.config.script_path(target.destination);
  if script.is_file() {
    run_script(&script, "postinst", changes)?;
  }

  Ok(())
}

/// Stat of the dummy if it is a regular file, else of the current destination.
fn permission_template(dummy: &Path, dest: &Path) -> Option<Metadata> {
  fs::metadata(dummy)
    .ok()
    .filter(Metadata::is_file)
    .or_else(|| fs::metadata(dest).ok())
}

fn apply_permissions(path: &Path, template: Option<&Metadata>, ownership: &Ownership) -> Result<(), HandlerError> {
  let current = fs::metadata(path).map_err(|source| HandlerError::Write {
    path: path.to_path_buf(),
    source,
  })?;

  if let Some(template) = template
    && (template.uid() != current.uid() || template.gid() != current.gid())
    && let Err(e) = chown(
      path,
      Some(Uid::from_raw(template.uid())),
      Some(Gid::from_raw(template.gid())),
    )
  {
    warn!(path = %path.display(), error = %e, "failed to copy owner from template");
  }

  if ownership.user.is_some() || ownership.group.is_some() {
    let uid = ownership.user.as_deref().map(resolve_user).transpose();
    let gid = ownership.group.as_deref().map(resolve_group).transpose();
    let ownership_err = |message: String| HandlerError::Ownership {
      path: path.to_path_buf(),
      message,
    };
    let (uid, gid) = (uid.map_err(ownership_err)?, gid.map_err(ownership_err)?);
    chown(path, uid, gid).map_err(|e| ownership_err(e.to_string()))?;
    debug!(path = %path.display(), ?uid, ?gid, "applied owner override");
  }

  let mode = ownership.mode.or_else(|| template.map(|t| t.mode() & 0o7777));
  if let Some(mode) = mode {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| HandlerError::Write {
      path: path.to_path_buf(),
      source,
    })?;
  }

  Ok(())
}

fn resolve_user(name: &str) -> Result<Uid, String> {
  if let Ok(id) = name.parse::<u32>() {
    return Ok(Uid::from_raw(id));
  }
  match User::from_name(name) {
    Ok(Some(user)) => Ok(user.uid),
    Ok(None) => Err(format!("unknown user '{name}'")),
    Err(e) => Err(format!("looking up user '{name}': {e}")),
  }
}

fn resolve_group(name: &str) -> Result<Gid, String> {
  if let Ok(id) = name.parse::<u32>() {
    return Ok(Gid::from_raw(id));
  }
  match Group::from_name(name) {
    Ok(Some(group)) => Ok(group.gid),
    Ok(None) => Err(format!("unknown group '{name}'")),
    Err(e) => Err(format!("looking up group '{name}': {e}")),
  }
}
