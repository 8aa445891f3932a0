//! Logging for migration runs.
//!
//! A run over thousands of issues emits one `info` line per created issue, so
//! the terminal defaults to `warn`: what stays visible is what an operator has
//! to act on afterwards (unmapped users, missing target projects, rejected
//! writes, lookup fallbacks). `-v` brings the per-issue lines back.
//!
//! `--log-file` keeps a JSON audit trail of the run at `info` or finer, no
//! matter how quiet the terminal is.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::{Mutex, Once};

use anyhow::Result;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

const CRATE: &str = "redmine2gitlab";

/// Install the global subscriber for the CLI.
///
/// `RUST_LOG` overrides the terminal filter only; the log file keeps its own.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log file cannot be created,
/// or a subscriber is already installed.
pub fn init_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let terminal_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(terminal_filter(verbosity, quiet)))?;

    let terminal = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .with_file(cfg!(debug_assertions))
        .with_line_number(cfg!(debug_assertions))
        .with_ansi(std::io::stderr().is_terminal())
        .with_filter(terminal_filter);

    let audit = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::try_new(file_filter(verbosity))?);
            Some(layer)
        }
        None => None,
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(terminal).with(audit),
    )?;
    Ok(())
}

fn terminal_filter(verbosity: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbosity {
        0 => format!("{CRATE}=warn"),
        1 => format!("{CRATE}=info"),
        2 => format!("{CRATE}=debug"),
        _ => format!("{CRATE}=trace,ureq=debug"),
    }
}

fn file_filter(verbosity: u8) -> String {
    match verbosity {
        0 | 1 => format!("{CRATE}=info"),
        2 => format!("{CRATE}=debug"),
        _ => format!("{CRATE}=trace,ureq=debug"),
    }
}

/// Route crate logs at `debug` into the test harness output.
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(format!("{CRATE}=debug"))
            .with_test_writer()
            .try_init()
            .ok();
    });
}
