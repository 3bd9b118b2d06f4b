use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use procevents_core::DepthMode;
use std::path::PathBuf;

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum DepthModeArg {
    /// Expand exactly N levels of child processes
    PerLevel,
    /// Count every expanded process against N (legacy behavior)
    PerNode,
}

impl From<DepthModeArg> for DepthMode {
    fn from(arg: DepthModeArg) -> Self {
        match arg {
            DepthModeArg::PerLevel => DepthMode::PerLevel,
            DepthModeArg::PerNode => DepthMode::PerNode,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "procevents")]
#[command(about = "Export the events of a process, and optionally its child process tree, from Carbon Black Cloud", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Credentials profile to connect with
    #[arg(long, env = "CBC_PROFILE", default_value = "default")]
    pub profile: String,

    /// Credentials file (defaults to the standard .carbonblack locations)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Process GUID
    #[arg(long)]
    pub guid: String,

    /// When to start the search, e.g. 2022-03-01T00:00:00Z
    #[arg(long, value_parser = parse_timestamp, requires = "end")]
    pub start: Option<DateTime<Utc>>,

    /// When to end the search, e.g. 2022-03-02T00:00:00Z
    #[arg(long, value_parser = parse_timestamp, requires = "start")]
    pub end: Option<DateTime<Utc>>,

    /// Relative window ending now, e.g. -2w (takes precedence over --start/--end)
    #[arg(long, allow_hyphen_values = true)]
    pub window: Option<String>,

    /// Number of nesting levels of child processes to follow (0 exports the process only)
    #[arg(long = "follow-childprocs", default_value_t = 0)]
    pub follow_childprocs: u32,

    /// How the nesting level limit is counted
    #[arg(long, value_enum, default_value = "per-level")]
    pub depth_mode: DepthModeArg,

    /// Do not ask for confirmation before following more than 2 levels
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// File listing the attributes of each event type to include in the summary column
    #[arg(long)]
    pub summary: PathBuf,

    /// CSV file to write; with --follow-childprocs its directory receives every export file
    #[arg(long)]
    pub outfile: PathBuf,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Directory receiving tree exports: the parent of `--outfile`.
    pub fn output_dir(&self) -> PathBuf {
        match self.outfile.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an ISO 8601 timestamp like 2022-03-01T00:00:00Z: {}", e))
}

/// Whether an answer to the confirmation prompt means yes.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
