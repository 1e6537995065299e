//! kvlog CLI
//!
//! Offline inspection of a journal. Run it while the server is stopped: it
//! opens the backend directly and never appends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kvlog::backend::{open_backend, LogBackend};
use kvlog::config::{BackendKind, ConfigBuilder};
use kvlog::journal::{self, EventType};
use kvlog::{Config, KvError};
use tracing_subscriber::{fmt, EnvFilter};

/// kvlog CLI
#[derive(Parser, Debug)]
#[command(name = "kvlog-cli")]
#[command(about = "Inspect a kvlog journal")]
struct Args {
    /// JSON config file
    #[arg(short, long, env = "KVLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Journal backend (file, sqlite)
    #[arg(short, long, env = "KVLOG_BACKEND")]
    backend: Option<BackendKind>,

    /// Journal file for the file backend
    #[arg(long, env = "KVLOG_LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Database file for the sqlite backend
    #[arg(long, env = "KVLOG_SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every event in sequence order
    Dump,

    /// Replay the journal and report what it contains
    Verify,

    /// Replay the journal and print one key's value
    Get {
        /// The key to look up
        key: String,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> kvlog::Result<ExitCode> {
    let config = build_config(&args)?;
    let mut backend = open_backend(&config)?;

    let outcome = execute(&args.command, backend.as_mut());
    let closed = backend.close();
    let code = outcome?;
    closed?;
    Ok(code)
}

fn execute(command: &Commands, backend: &mut dyn LogBackend) -> kvlog::Result<ExitCode> {
    match command {
        Commands::Dump => {
            journal::replay(backend, |event| {
                println!(
                    "{}\t{}\t{}\t{}",
                    event.sequence, event.event_type, event.key, event.value
                );
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify => {
            let mut state = HashMap::new();
            let mut puts = 0u64;
            let mut deletes = 0u64;
            let summary = journal::replay(backend, |event| match event.event_type {
                EventType::Put => {
                    puts += 1;
                    state.insert(event.key, event.value);
                }
                EventType::Delete => {
                    deletes += 1;
                    state.remove(&event.key);
                }
            })?;

            println!("backend:       {}", backend.name());
            println!("events:        {}", summary.events);
            println!("puts:          {}", puts);
            println!("deletes:       {}", deletes);
            println!("last sequence: {}", summary.last_sequence);
            println!("live keys:     {}", state.len());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Get { key } => {
            if key.is_empty() {
                return Err(KvError::EmptyKey);
            }
            let mut value = None;
            journal::replay(backend, |event| {
                if &event.key == key {
                    value = match event.event_type {
                        EventType::Put => Some(event.value),
                        EventType::Delete => None,
                    };
                }
            })?;

            match value {
                Some(value) => {
                    println!("{}", value);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("{}: {}", key, KvError::KeyNotFound);
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

fn build_config(args: &Args) -> kvlog::Result<Config> {
    let base = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    let mut builder = ConfigBuilder::from_config(base);
    if let Some(kind) = args.backend {
        builder = builder.backend(kind);
    }
    if let Some(path) = &args.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &args.sqlite_path {
        builder = builder.sqlite_path(path);
    }
    Ok(builder.build())
}
