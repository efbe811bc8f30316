use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap_complete::{generate, Shell};

use trip_cli::cli::build_cli_command;
use trip_io::write_staged;

const BIN_NAME: &str = "tripdur";

/// Completion script for `shell`, rendered in memory.
pub fn render(shell: Shell) -> Vec<u8> {
    let mut cmd = build_cli_command();
    let mut script = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut script);
    script
}

/// Print the script, or publish it to `out` through a staged write.
pub fn handle(shell: Shell, out: Option<&Path>) -> Result<()> {
    let script = render(shell);
    match out {
        Some(path) => {
            write_staged(&script, path, "completions")?;
            println!("Wrote {shell} completion to {}", path.display());
        }
        None => io::stdout()
            .lock()
            .write_all(&script)
            .context("writing completion to stdout")?,
    }
    Ok(())
}
