//! confreg-lib: handler and template regeneration engine for confreg
//!
//! Given a set of changed configuration keys, the engine works out which
//! generated artifacts depend on them and regenerates them:
//! - `manifest`: declarative `.info` files describing generated artifacts
//! - `handler`: file, multifile, script and module handlers built from manifests
//! - `index`: the pattern → handler dependency index and its persisted cache
//! - `diversion`: keeps package-owned files diverted while a handler owns them
//! - `template`: the `@%@var@%@` / `@!@code@!@` rendering engine
//! - `engine`: load/update/register/unregister/dispatch/commit lifecycle

pub mod cache;
pub mod config;
pub mod consts;
pub mod diversion;
pub mod engine;
pub mod handler;
pub mod index;
pub mod lock;
pub mod manifest;
pub mod paths;
pub mod registry;
pub mod template;
pub mod util;
