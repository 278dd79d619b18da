//! "Do not edit" banners.
//!
//! `@%@UCRWARNING=# @%@` expands to a bilingual notice that the file is
//! generated, followed by the template files to edit instead. The part after
//! `=` prefixes every banner line (`# ` when omitted); an `_ASCII` suffix on
//! the name drops everything outside printable ASCII.

const NAMES: [&str; 3] = ["UCSWARNING", "BCWARNING", "UCRWARNING"];

const DEFAULT_PREFIX: &str = "# ";

const BANNER: [&str; 6] = [
  "Warning: This file is auto-generated and might be overwritten by",
  "         confreg.",
  "         Please edit the following file(s) instead:",
  "Warnung: Diese Datei wurde automatisch generiert und kann durch",
  "         confreg überschrieben werden.",
  "         Bitte bearbeiten Sie an Stelle dessen die folgende(n) Datei(en):",
];

/// A parsed warning variable.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Warning<'a> {
  prefix: &'a str,
  ascii: bool,
}

fn parse(name: &str) -> Option<Warning<'_>> {
  let (base, prefix) = match name.split_once('=') {
    Some((base, prefix)) => (base, prefix),
    None => (name, DEFAULT_PREFIX),
  };
  let (base, ascii) = match base.strip_suffix("_ASCII") {
    Some(base) => (base, true),
    None => (base, false),
  };
  NAMES.contains(&base).then_some(Warning { prefix, ascii })
}

/// Whether `name` is a warning variable rather than a registry key.
pub fn is_warning(name: &str) -> bool {
  parse(name).is_some()
}

/// Banner for warning variable `name`, or `None` if it is not one.
pub fn banner(name: &str, sources: &[String]) -> Option<String> {
  let warning = parse(name)?;

  let mut lines: Vec<String> = BANNER.iter().map(|line| format!("{}{line}", warning.prefix)).collect();
  lines.push(warning.prefix.to_string());
  let mut sources: Vec<&String> = sources.iter().collect();
  sources.sort();
  lines.extend(sources.into_iter().map(|src| format!("{}\t{src}", warning.prefix)));
  lines.push(warning.prefix.to_string());

  let text = lines.join("\n");
  if warning.ascii {
    return Some(
      text
        .chars()
        .filter(|c| matches!(c, ' '..='~' | '\t' | '\n'))
        .collect(),
    );
  }
  Some(text)
}
