use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use stats_pipe::{PipeConfig, StatsPipe, StatsRecord};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the stats pipe (defaults to <temp dir>/monitorPipe)
    #[arg(short, long)]
    pipe: Option<PathBuf>,

    /// Only show records from this component
    #[arg(short, long)]
    component: Option<String>,

    /// Echo lines as received instead of formatting them. Malformed lines
    /// are echoed too unless --component is given
    #[arg(long)]
    raw: bool,

    /// Exit once every writer has closed the pipe
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = args.pipe.clone().map(PipeConfig::at).unwrap_or_default();
    let pipe = StatsPipe::new(config);
    pipe.ensure_exists().context("Failed to prepare stats pipe")?;
    info!("Reading stats from {}", pipe.path().display());

    loop {
        // Blocks until some collector opens the pipe.
        let file = File::open(pipe.path())
            .with_context(|| format!("Failed to open {}", pipe.path().display()))?;
        for line in BufReader::new(file).lines() {
            let line = line.context("Failed to read from stats pipe")?;
            if let Some(output) = render_line(&args, &line) {
                println!("{output}");
            }
        }
        if args.once {
            break;
        }
        info!("All writers closed, waiting for the next one");
    }
    Ok(())
}

/// Formats one pipe line for output, or `None` if it should not be shown.
fn render_line(args: &Args, line: &str) -> Option<String> {
    // Without a filter there is nothing to parse for.
    if args.raw && args.component.is_none() {
        return Some(line.to_owned());
    }

    let record = match StatsRecord::from_json(line.as_bytes()) {
        Ok(record) => record,
        Err(err) => {
            warn!("Skipping malformed line: {}", err);
            return None;
        }
    };
    if let Some(component) = &args.component {
        if record.component_name() != component {
            return None;
        }
    }
    if args.raw {
        return Some(line.to_owned());
    }

    let blob = if record.blob().is_empty() { "-" } else { record.blob() };
    let fields = record
        .value()
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    Some(format!(
        "{} {} {} {}",
        record.component_name(),
        record.operation(),
        blob,
        fields
    ))
}
