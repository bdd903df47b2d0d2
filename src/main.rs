//! UCS syslog filter - pipeline glue.
//!
//! Reads one JSON record per line on stdin, enriches it, and writes it
//! back out on stdout. All the interesting behavior lives in the
//! library; this binary only moves records.

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ucsfilterd::classify::SyslogFilter;
use ucsfilterd::config::{FilterConfig, CONFIG_PATH};
use ucsfilterd::record::Record;

#[derive(Parser, Debug)]
#[command(version, about = "Enrich UCS syslog records from stdin to stdout")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = FilterConfig::load(&args.config)?;
    let mut filter = SyslogFilter::from_config(config)?;

    info!("ucsfilterd v{} ready", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(mut record) => {
                filter.process(&mut record);
                serde_json::to_writer(&mut out, &record)?;
                out.write_all(b"\n")?;
            }
            Err(e) => {
                // Not a record we can enrich; pass it through untouched.
                warn!("unparsable record, passing through: {e}");
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
        }
    }

    info!("input closed, shutting down");
    Ok(())
}
