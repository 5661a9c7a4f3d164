//! Opener Coach CLI Application
//!
//! This is the command-line interface for the opener coach.
//! It uses the opener-engine library and adds:
//! - Host event subscription and the event bridge
//! - Active player/job/zone tracking
//! - Published progress state
//! - Session replay, live watching and progress reports

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opener_engine::{LogLineParser, OpenerCatalog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

mod bridge;
mod config;
mod events;
mod host;
mod replay;
mod report;
mod state;

use bridge::EventBridge;
use config::{AppConfig, DuplicatePolicy};
use replay::{ReplayHost, SessionRecord};
use report::ReplayTally;

/// Opener Coach - Track opener execution from host combat logs
#[derive(Parser, Debug)]
#[command(name = "opener-cli")]
#[command(about = "Track opener execution from host combat-log events", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Extra opener definition directory (can be repeated)
    #[arg(long = "catalog", value_name = "DIR", global = true)]
    catalog_dirs: Vec<PathBuf>,

    /// Skip the builtin opener definitions
    #[arg(long, global = true)]
    no_builtin: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog openers
    List {
        /// Only show openers for this job code
        #[arg(long)]
        job: Option<String>,
    },

    /// Print an opener's action sequence
    Show {
        /// Opener id
        opener_id: String,
    },

    /// Replay a recorded host session and report progress
    Replay {
        /// Session recording (JSON lines)
        #[arg(short, long, value_name = "FILE")]
        session: PathBuf,

        /// Flag the expected action as missed on mismatches
        #[arg(long)]
        mark_missed: bool,

        /// Override the duplicate line policy
        #[arg(long, value_enum)]
        duplicate_policy: Option<DuplicatePolicy>,
    },

    /// Follow host events from stdin and print progress as it changes
    Watch {
        /// Flag the expected action as missed on mismatches
        #[arg(long)]
        mark_missed: bool,

        /// Override the duplicate line policy
        #[arg(long, value_enum)]
        duplicate_policy: Option<DuplicatePolicy>,
    },

    /// Parse one `|`-separated log line
    Parse {
        /// Raw log line
        line: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Opener Coach CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using engine library v{}", opener_engine::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);

    match &args.command {
        Command::Parse { line } => parse_mode(line),
        Command::List { job } => {
            let catalog = load_catalog(&config)?;
            print!("{}", report::catalog_listing(&catalog, job.as_deref()));
            Ok(())
        }
        Command::Show { opener_id } => {
            let catalog = load_catalog(&config)?;
            match catalog.by_id(opener_id) {
                Some(opener) => print!("{}", report::opener_sequence(opener)),
                None => println!("No opener with id '{}'", opener_id),
            }
            Ok(())
        }
        Command::Replay { session, .. } => replay_mode(session, config),
        Command::Watch { .. } => watch_mode(config).await,
    }
}

/// Fold command line flags into the loaded configuration
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if args.no_builtin {
        config.catalog.include_builtin = false;
    }
    config.catalog.directories.extend(args.catalog_dirs.iter().cloned());

    let (mark_missed, duplicate_policy) = match &args.command {
        Command::Replay {
            mark_missed,
            duplicate_policy,
            ..
        }
        | Command::Watch {
            mark_missed,
            duplicate_policy,
        } => (*mark_missed, *duplicate_policy),
        _ => return,
    };
    if mark_missed {
        config.bridge.mark_missed_on_mismatch = true;
    }
    if let Some(policy) = duplicate_policy {
        config.bridge.duplicate_policy = policy;
    }
}

fn load_catalog(config: &AppConfig) -> Result<OpenerCatalog> {
    OpenerCatalog::load_all(&config.catalog).context("Failed to load opener catalog")
}

/// Parse mode - decode a single log line and print it
fn parse_mode(line: &str) -> Result<()> {
    match LogLineParser::parse_line(line) {
        Some(action) => {
            println!("Source:   {} ({})", action.source_name, action.source_id);
            println!("Ability:  {} ({})", action.ability_name, action.ability_id);
            if let Some(target) = &action.target_name {
                println!("Target:   {} ({})", target, action.target_id.as_deref().unwrap_or(""));
            }
            match action.parsed_timestamp() {
                Some(ts) => println!("Time:     {}", ts.to_rfc3339()),
                None => println!("Time:     {} (unparsed)", action.timestamp),
            }
            println!("Area:     {}", action.is_area());
        }
        None => println!("Not an ability line"),
    }
    Ok(())
}

/// Replay mode - drive the bridge from a recorded session
fn replay_mode(session: &Path, config: AppConfig) -> Result<()> {
    let catalog = Arc::new(load_catalog(&config)?);
    let records = replay::load_session(session)
        .with_context(|| format!("Failed to load session: {:?}", session))?;
    log::info!("Replaying {} session records from {:?}", records.len(), session);

    let host = Arc::new(ReplayHost::new());
    let mut bridge = EventBridge::new(host.clone(), catalog, config.bridge);
    let mut events = bridge.start();

    let mut tally = ReplayTally::default();
    for record in records {
        if let Some(command) = host.play(record) {
            log::info!("Session command: {:?}", command);
            bridge.apply_command(&command);
        }
        for outcome in bridge.pump(&mut events) {
            tally.record(&outcome);
        }
    }
    bridge.shutdown();

    print!("{}", report::progress_report(&bridge.snapshot(), &tally));
    Ok(())
}

/// Watch mode - follow a live event feed on stdin
///
/// Each stdin line is a session record. The bridge runs until stdin closes;
/// a printer task writes a status line whenever the published state changes.
async fn watch_mode(config: AppConfig) -> Result<()> {
    let catalog = Arc::new(load_catalog(&config)?);
    let host = Arc::new(ReplayHost::new());
    let mut bridge = EventBridge::new(host.clone(), catalog, config.bridge);
    let events = bridge.start();

    let mut updates = bridge.subscribe_state();
    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while updates.changed().await.is_ok() {
            let line = report::status_line(&updates.borrow_and_update(), chrono::Utc::now());
            if line != last {
                println!("{}", line);
                last = line;
            }
        }
    });

    let feeder = host.clone();
    let feed = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            match replay::parse_record(&line) {
                Ok(Some(SessionRecord::Control { control })) => {
                    log::warn!("Line {}: control record {:?} ignored while watching", line_no, control);
                }
                Ok(Some(record)) => {
                    feeder.play(record);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Line {}: skipping invalid record: {}", line_no, e),
            }
        }
        feeder.close();
        Ok::<_, std::io::Error>(line_no)
    });

    let mut tally = ReplayTally::default();
    bridge.run(events, |outcome| tally.record(outcome)).await;
    let lines = feed
        .await
        .context("stdin reader task failed")?
        .context("Failed to read host events from stdin")?;
    log::info!("Host feed closed after {} lines", lines);

    bridge.shutdown();
    let final_state = bridge.snapshot();
    drop(bridge);
    printer.await.context("status printer task failed")?;

    print!("{}", report::progress_report(&final_state, &tally));
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
