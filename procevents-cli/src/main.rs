// Procevents CLI - export process events and process trees from Carbon Black Cloud

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{is_affirmative, Cli};
use procevents_core::{CbcCredentials, CbcEventSource, Exporter, Summarizer, TimeRange};
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Following more levels than this asks for confirmation first.
const CONFIRM_DEPTH_ABOVE: u32 = 2;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("procevents={0},procevents_core={0}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let range = time_range(&cli)?;
    debug!("Using time range: {}", range);

    // A bad summary file must stop the run before anything is queried.
    let summarizer = Summarizer::from_file(&cli.summary)?;
    info!("Loaded summary attributes from {}", cli.summary.display());

    if cli.follow_childprocs > CONFIRM_DEPTH_ABOVE && !cli.yes && !confirm_deep_traversal(cli.follow_childprocs)? {
        info!("Export cancelled");
        return Ok(());
    }

    let credentials = CbcCredentials::load(&cli.profile, cli.credentials.as_deref())
        .with_context(|| format!("Failed to load credentials profile '{}'", cli.profile))?;
    debug!("Connecting to {} with org key {}", credentials.url, credentials.org_key);
    let source = CbcEventSource::new(credentials)?;
    let exporter = Exporter::new(source, summarizer);

    if cli.follow_childprocs > 0 {
        let output_dir = cli.output_dir();
        let export = exporter.export_process_tree_events(
            &cli.guid,
            &range,
            &output_dir,
            cli.follow_childprocs,
            cli.depth_mode.into(),
        )?;
        info!(
            "Exported {} event files for {} processes",
            export.event_files.len(),
            export.nodes
        );
        println!("Process tree exported to {}", export.tree_file.display());
    } else {
        match exporter.export_process_events(&cli.guid, &range, &cli.outfile)? {
            Some(rows) => println!("Exported {} events to {}", rows, cli.outfile.display()),
            None => println!("No events found for process {}", cli.guid),
        }
    }

    Ok(())
}

fn time_range(cli: &Cli) -> Result<TimeRange> {
    if let Some(window) = &cli.window {
        if cli.start.is_some() {
            info!("--window {} takes precedence over --start/--end", window);
        }
        return TimeRange::window(window);
    }

    match (cli.start, cli.end) {
        (Some(start), Some(end)) => TimeRange::between(start, end),
        _ => Err(anyhow::anyhow!("Provide either --start and --end, or --window")),
    }
}

fn confirm_deep_traversal(depth: u32) -> Result<bool> {
    warn!("Following {} nesting levels of children processes may last quite long", depth);
    print!(
        "Following more than {} levels of children processes may last quite long. Are you sure to continue? [yes/no] ",
        CONFIRM_DEPTH_ABOVE
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}
