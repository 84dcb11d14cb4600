//! Pulse CLI - command-line front end for the teampulse engine
//!
//! Commands:
//! - run: load fixtures and drive the periodic aggregation job
//! - aggregate: one-shot aggregation for a (user, week)
//! - classify: one-shot engagement classification for a (user, week)
//! - report: print the weekly report (or one team's summary)
//! - override: pin a user-week healthy with a recorded reason

use std::fs;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use teampulse::report::ReportBuilder;
use teampulse::store::MemoryStore;
use teampulse::types::{ActivityEvent, User, WeekFlags};
use teampulse::week::current_week_start;
use teampulse::{
    AggregationJob, EngineConfig, EventStore, MetricsEngine, MetricsStore, ENGINE_VERSION,
};

/// Pulse - engagement analytics over weekly team activity signals
#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Aggregate activity events into weekly engagement metrics", long_about = None)]
struct Cli {
    /// Users file: JSON array of directory users
    #[arg(long, global = true)]
    users: Option<PathBuf>,

    /// Events file: NDJSON activity events (use - for stdin)
    #[arg(long, global = true)]
    events: Option<PathBuf>,

    /// Flags file: NDJSON of {user_id, week_start, flags} records
    #[arg(long, global = true)]
    flags: Option<PathBuf>,

    /// Engine configuration JSON; absent fields take defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the aggregation job
    Run {
        /// Run a single batch instead of looping on the interval
        #[arg(long)]
        once: bool,
    },

    /// Aggregate one (user, week) and print the row
    Aggregate {
        #[arg(long)]
        user: String,
        /// Monday-aligned week start (defaults to the current week)
        #[arg(long)]
        week: Option<NaiveDate>,
    },

    /// Classify one (user, week) and print the updated row
    Classify {
        #[arg(long)]
        user: String,
        #[arg(long)]
        week: Option<NaiveDate>,
    },

    /// Print the weekly report, or one team's summary
    Report {
        #[arg(long)]
        week: Option<NaiveDate>,
        #[arg(long)]
        team: Option<String>,
    },

    /// Record a manual status override for a user-week
    Override {
        #[arg(long)]
        user: String,
        #[arg(long)]
        week: Option<NaiveDate>,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "cli")]
        by: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| format!("reading {}: {e}", path.display()))?;
            EngineConfig::from_json(&raw).map_err(|e| format!("parsing config: {e}"))?
        }
        None => EngineConfig::default(),
    };

    let (engine, store) = MetricsEngine::with_memory_store(config);
    load_fixtures(&cli, &store)?;

    let week_or_current = |week: Option<NaiveDate>| week.unwrap_or_else(current_week_start);

    match cli.command {
        Commands::Run { once } => {
            let job = AggregationJob::new(engine);
            let shutdown = AtomicBool::new(false);
            if once {
                let stats = job.run_once(&shutdown).map_err(|e| e.to_string())?;
                print_json(&stats)?;
            } else {
                job.run_scheduler(&shutdown);
            }
        }
        Commands::Aggregate { user, week } => {
            let row = engine
                .aggregate_week(&user, week_or_current(week))
                .map_err(|e| e.to_string())?;
            print_json(&row)?;
        }
        Commands::Classify { user, week } => {
            let row = engine
                .update_engagement_status(&user, week_or_current(week))
                .map_err(|e| e.to_string())?;
            print_json(&row)?;
        }
        Commands::Report { week, team } => {
            let directory = engine.directory();
            let builder = ReportBuilder::new(store.as_ref(), directory.as_ref());
            let week = week_or_current(week);
            match team {
                Some(team_id) => {
                    let summary = builder
                        .team_summary(&team_id, week)
                        .map_err(|e| e.to_string())?;
                    print_json(&summary)?;
                }
                None => {
                    let report = builder.weekly_report(week).map_err(|e| e.to_string())?;
                    print_json(&report)?;
                }
            }
        }
        Commands::Override {
            user,
            week,
            reason,
            by,
        } => {
            let row = engine
                .apply_override(&user, week_or_current(week), &reason, &by)
                .map_err(|e| e.to_string())?;
            print_json(&row)?;
        }
    }

    Ok(())
}

/// Load directory, event, and flag fixtures into the in-memory store
fn load_fixtures(cli: &Cli, store: &Arc<MemoryStore>) -> Result<(), String> {
    if let Some(path) = &cli.users {
        let raw = read_input(path)?;
        let users: Vec<User> =
            serde_json::from_str(&raw).map_err(|e| format!("parsing users: {e}"))?;
        for user in users {
            store.add_user(user);
        }
    }

    if let Some(path) = &cli.events {
        for (number, line) in read_lines(path)?.into_iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: ActivityEvent = serde_json::from_str(&line)
                .map_err(|e| format!("events line {}: {e}", number + 1))?;
            store.append(event).map_err(|e| e.to_string())?;
        }
    }

    if let Some(path) = &cli.flags {
        for (number, line) in read_lines(path)?.into_iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: serde_json::Value = serde_json::from_str(&line)
                .map_err(|e| format!("flags line {}: {e}", number + 1))?;
            apply_flag_record(store, &record)
                .map_err(|e| format!("flags line {}: {e}", number + 1))?;
        }
    }

    Ok(())
}

/// Apply one `{user_id, week_start, flags}` record to its metrics row,
/// creating an empty row when the week has not been aggregated yet
fn apply_flag_record(store: &MemoryStore, record: &serde_json::Value) -> Result<(), String> {
    let user_id = record["user_id"]
        .as_str()
        .ok_or("missing user_id")?
        .to_string();
    let week_start: NaiveDate = record["week_start"]
        .as_str()
        .ok_or("missing week_start")?
        .parse()
        .map_err(|e| format!("week_start: {e}"))?;
    let flags = WeekFlags::from_loose_json(&record["flags"]).map_err(|e| e.to_string())?;

    let mut row = store
        .get(&user_id, week_start)
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| teampulse::WeeklyUserMetrics::new(&user_id, week_start));
    row.flags = flags;
    store.upsert(row).map_err(|e| e.to_string())
}

fn read_input(path: &Path) -> Result<String, String> {
    if path.as_os_str() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading from stdin (end with EOF)...");
        }
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("reading stdin: {e}"))?;
        Ok(buffer)
    } else {
        fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, String> {
    if path.as_os_str() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading from stdin (end with EOF)...");
        }
        io::stdin()
            .lock()
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| format!("reading stdin: {e}"))
    } else {
        Ok(read_input(path)?.lines().map(str::to_string).collect())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
