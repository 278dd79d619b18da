//! Names and fixed tokens shared across the engine.

/// Application name used in default paths and generated banners.
pub const APP_NAME: &str = "confreg";

/// Only manifest files carrying this suffix are read.
pub const MANIFEST_SUFFIX: &str = ".info";

/// Suffix of the backup location a diverted file is moved to.
pub const DIVERSION_SUFFIX: &str = ".debian";

/// Owner tag the diversion database records for local diversions.
pub const LOCAL_DIVERSION_OWNER: &str = ":";

/// Delimiter of a variable reference: `@%@name@%@`.
pub const VARIABLE_TOKEN: &str = "@%@";

/// Delimiter of an embedded code block: `@!@code@!@`.
pub const EXECUTE_TOKEN: &str = "@!@";

/// Environment variable relocating every managed path below a different root.
pub const ROOT_ENV: &str = "CONFREG_ROOT";

/// Environment variable overriding the diversion tool.
pub const DIVERT_PROGRAM_ENV: &str = "CONFREG_DIVERT_PROGRAM";

/// Environment variables carrying the registry snapshot path into embedded code.
pub const REGISTRY_SNAPSHOT_ENVS: [&str; 2] = ["CONFIG_REGISTRY", "BASE_CONFIG"];
