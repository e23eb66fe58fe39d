use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::storm::projector::MAX_HORIZON_HOURS;

#[derive(Debug, Parser)]
#[command(
    name = "stormtrack",
    version,
    about = "Ingest storm snapshots, query event history, and project tracks"
)]
struct Cli {
    /// Print the full command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one ingestion pass over the snapshot root.
    Ingest {
        /// Snapshot root; defaults to STORM_DATA_DIR.
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Query stored event records.
    Events {
        #[command(subcommand)]
        query: EventsCommand,
    },
    /// Project the most recent track of an event forward.
    Predict {
        event_id: String,
        /// Number of hourly steps to project.
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_HORIZON_HOURS)))]
        hours: Option<u32>,
        /// Skip writing the GeoJSON artifact.
        #[arg(long)]
        no_render: bool,
    },
    /// Re-ingest on a schedule.
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },
    /// Ask a running watcher daemon to exit.
    Stop,
    Status,
}

#[derive(Debug, Subcommand)]
enum EventsCommand {
    /// Every stored capture, oldest snapshot first.
    All,
    /// Captures of one event, oldest snapshot first.
    History { event_id: String },
    /// One entry per event with its latest name.
    Unique,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if let Some(data) = &report.data {
        println!("{}", serde_json::to_string_pretty(data)?);
        for issue in &report.issues {
            eprintln!("issue: {issue}");
        }
        return Ok(());
    }

    let status = if report.ok { "ok" } else { "failed" };
    println!("{}: {status}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Ingest { root } => {
            commands::ingest::run(&commands::ingest::IngestCommandOptions { root })?
        }
        Command::Events { query } => {
            let query = match query {
                EventsCommand::All => commands::events::EventsQuery::All,
                EventsCommand::History { event_id } => {
                    commands::events::EventsQuery::History(event_id)
                }
                EventsCommand::Unique => commands::events::EventsQuery::Unique,
            };
            commands::events::run(&query)?
        }
        Command::Predict {
            event_id,
            hours,
            no_render,
        } => commands::predict::run(&commands::predict::PredictOptions {
            event_id,
            hours,
            no_render,
        })?,
        Command::Watch { once, daemon } => {
            commands::watch::run(&commands::watch::WatchOptions { once, daemon })?
        }
        Command::Stop => commands::stop::run()?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
