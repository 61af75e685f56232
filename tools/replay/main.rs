//! Host-side replay of recorded sample files
//!
//! Pushes a sample file through the full pipeline on a simulated link and prints every
//! transmitted float, so firmware output can be diffed against a batch computation.
//!
//! The input format is one line with the sample count, then one `x y z` line per
//! sample; the last sample is expected to be the all-zero terminator.
//!
//! # Usage
//!
//! ```bash
//! replay run samples.txt --window 100
//! replay config
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tristream::logging::{self, LoggingConfig, OutputFormat};
use tristream::protocol::{floats_from_le_bytes, Sample};
use tristream::{HostHarness, StreamConfig};

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "Replay a sample file through the statistics pipeline", long_about = None)]
struct Cli {
    /// Configuration file (defaults and TRISTREAM_ variables still apply)
    #[arg(long, global = true, default_value = tristream::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a sample file and print the transmitted floats
    Run {
        /// Sample file: count line, then `x y z` lines
        input: PathBuf,

        /// Override the configured window size
        #[arg(long)]
        window: Option<usize>,

        /// Print pipeline counters as JSON to stderr when done
        #[arg(long)]
        metrics: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = StreamConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let format = if cli.json_logs {
        OutputFormat::Json
    } else {
        OutputFormat::Compact
    };
    logging::init(LoggingConfig::from_stream_config(&config)?.with_format(format))?;

    match cli.command {
        Commands::Run {
            input,
            window,
            metrics,
        } => {
            if let Some(window) = window {
                config.stats.window_size = window;
            }
            run(&config, &input, metrics)
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn run(config: &StreamConfig, input: &Path, print_metrics: bool) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let samples = parse_samples(&text)?;
    info!(samples = samples.len(), path = %input.display(), "replaying");

    if samples.last().is_some_and(|s| !s.is_terminator()) {
        warn!("input does not end with a terminator; medians will not be reported");
    }

    let mut harness = HostHarness::new(config)?;
    harness.feed(samples)?;

    for (i, value) in floats_from_le_bytes(&harness.take_output()).iter().enumerate() {
        println!("{}", format_line(i + 1, f64::from(*value)));
    }

    if print_metrics {
        eprintln!("{}", serde_json::to_string_pretty(&harness.metrics())?);
    }
    Ok(())
}

fn parse_samples(text: &str) -> Result<Vec<Sample>> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let count: usize = lines
        .next()
        .context("empty input")?
        .trim()
        .parse()
        .context("first line must be the sample count")?;

    let mut samples = Vec::with_capacity(count);
    for (n, line) in lines.take(count).enumerate() {
        let values = line
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("sample {}: not a number", n + 1))?;
        let &[x, y, z] = values.as_slice() else {
            bail!("sample {}: expected 3 values, got {}", n + 1, values.len());
        };
        samples.push(Sample::new(x, y, z));
    }

    if samples.len() != count {
        bail!("expected {} samples, found {}", count, samples.len());
    }
    Ok(samples)
}

/// `index value` with a space sign column and a two-digit exponent, the layout of the
/// batch checker's `{:< 5} {:> 15e}`.
fn format_line(index: usize, value: f64) -> String {
    format!("{:<5} {:>15}", format!(" {}", index), format_exp(value))
}

fn format_exp(value: f64) -> String {
    if value.is_nan() {
        return " nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { " inf" } else { "-inf" }.to_string();
    }

    let rendered = format!("{:.6e}", value.abs());
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((&rendered, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if value.is_sign_negative() { '-' } else { ' ' };
    let exp_sign = if exponent < 0 { '-' } else { '+' };
    format!("{sign}{mantissa}e{exp_sign}{:02}", exponent.abs())
}
