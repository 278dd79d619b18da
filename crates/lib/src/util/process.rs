//! Subprocess plumbing.

use std::io::{self, Write};
use std::process::{Command, Output, Stdio};
use std::thread;

use tracing::debug;

/// Runs `command`, feeding `input` on stdin, and waits for it to exit.
///
/// Stdin is written from a separate thread so a child that produces output
/// before it has consumed all of its input cannot deadlock. Stdout and
/// stderr are captured only if the caller configured them as piped.
pub fn run_with_input(command: &mut Command, input: Vec<u8>) -> io::Result<Output> {
  let mut child = command.stdin(Stdio::piped()).spawn()?;
  debug!(pid = child.id(), input_len = input.len(), "spawned process");

  let writer = child.stdin.take().map(|mut stdin| {
    thread::spawn(move || {
      // The child may legitimately exit without reading its input.
      match stdin.write_all(&input) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
      }
    })
  });

  let output = child.wait_with_output()?;

  if let Some(writer) = writer {
    writer
      .join()
      .map_err(|_| io::Error::other("stdin writer thread panicked"))??;
  }

  Ok(output)
}
