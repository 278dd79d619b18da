//! Lists the dependency index straight from the cache.
//!
//! Never rebuilds: a rebuild reconciles diversions, which a listing must
//! not do.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use confreg_lib::cache;
use confreg_lib::handler::Handler;
use confreg_lib::lock::LockMode;

use super::Session;
use crate::output::{print_info, print_item, print_json, print_stat, symbols};

#[derive(Serialize)]
struct Listing<'a> {
  patterns: BTreeMap<&'a str, Vec<String>>,
  handlers: Vec<&'a Handler>,
  pending: BTreeMap<&'a str, Vec<&'a str>>,
}

pub fn cmd_handlers(session: &Session, json: bool) -> Result<()> {
  let _lock = session.lock(LockMode::Shared, "handlers")?;

  let state = cache::load(&session.config.cache_file).context("Failed to read handler cache (run 'confreg update')")?;

  let listing = Listing {
    patterns: state
      .index
      .patterns()
      .iter()
      .map(|(pattern, ids)| (pattern.as_str(), ids.iter().map(ToString::to_string).collect()))
      .collect(),
    handlers: state.index.handlers().collect(),
    pending: state
      .pending
      .iter()
      .map(|(multifile, subfiles)| {
        (
          multifile.as_str(),
          subfiles.iter().map(|subfile| subfile.path.as_str()).collect(),
        )
      })
      .collect(),
  };

  if json {
    return print_json(&listing);
  }

  if listing.handlers.is_empty() {
    print_info("No handlers registered");
    return Ok(());
  }

  for (pattern, ids) in &listing.patterns {
    println!("{pattern}");
    for id in ids {
      print_item(symbols::ARROW, id);
    }
  }

  if !listing.pending.is_empty() {
    println!();
    println!("Pending subfiles:");
    for (multifile, subfiles) in &listing.pending {
      for subfile in subfiles {
        print_item(symbols::INFO, &format!("{subfile} (for {multifile})"));
      }
    }
  }

  println!();
  print_stat("Handlers", &listing.handlers.len().to_string());
  print_stat("Patterns", &listing.patterns.len().to_string());

  Ok(())
}
