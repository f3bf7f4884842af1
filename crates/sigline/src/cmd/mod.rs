use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod loopback;
pub mod plan;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show how a message would be split into packets.
    Plan(PlanArgs),
    /// Run a full offer/answer exchange over an in-memory link.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Plan(args) => plan::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Link unit size in bytes (MTU).
    #[arg(long, default_value_t = sigline::link::DEFAULT_UNIT_SIZE)]
    pub unit_size: usize,
    /// Message text.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read the message from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Link unit size in bytes (MTU).
    #[arg(long, default_value_t = sigline::link::DEFAULT_UNIT_SIZE)]
    pub unit_size: usize,
    /// Local candidates each side trickles.
    #[arg(long, default_value_t = 2)]
    pub candidates: usize,
    /// How long each side waits for the other's description (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub answer_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        for input in ["", "0", "abc", "5m", "-1s"] {
            assert_eq!(parse_duration(input).unwrap_err().code, USAGE, "{input}");
        }
    }
}
