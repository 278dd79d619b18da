//! confreg: regenerate configuration files when registry keys change.

mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::Session;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CONFREG_LOG";

/// confreg - regenerate configuration files from registry templates
#[derive(Parser)]
#[command(name = "confreg")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Registry file with the current values (default: <root>/etc/confreg/base.conf)
  #[arg(long, global = true, env = "CONFREG_REGISTRY")]
  registry: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Rebuild the handler index from every manifest
  Update,

  /// Regenerate all files, or only the given ones
  Commit {
    /// Destinations to regenerate, e.g. /etc/hosts
    files: Vec<PathBuf>,
  },

  /// Add a package's handlers and generate their files
  Register {
    /// Package whose manifest to read
    package: String,
  },

  /// Withdraw a package's handlers
  Unregister {
    /// Package whose manifest to read
    package: String,
  },

  /// Run the handlers depending on the given keys
  Trigger {
    /// Registry keys to treat as changed
    #[arg(required = true)]
    keys: Vec<String>,
  },

  /// List the dependency index
  Handlers {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn init_logging(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let session = Session::from_env(cli.registry);

  match cli.command {
    Commands::Update => cmd::cmd_update(&session),
    Commands::Commit { files } => cmd::cmd_commit(&session, &files),
    Commands::Register { package } => cmd::cmd_register(&session, &package),
    Commands::Unregister { package } => cmd::cmd_unregister(&session, &package),
    Commands::Trigger { keys } => cmd::cmd_trigger(&session, &keys),
    Commands::Handlers { json } => cmd::cmd_handlers(&session, json),
  }
}
