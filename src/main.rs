//! Scalping signal engine - main entry point
//!
//! Subcommands:
//! - run: poll the market, emit signals and resolve outcomes until Ctrl+C
//! - scan: one cycle against live data, printed as a table
//! - resolve: force-evaluate every pending signal
//! - stats: performance summary of stored signals
//! - export: write signal history to CSV

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "scalp-signals")]
#[command(about = "Multi-timeframe crypto scalping signals with cooldown gating and outcome tracking", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON console logs (for log shippers)
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the signal loop until Ctrl+C
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/scalping.json")]
        config: String,

        /// Keep signals in memory and only log notifications
        #[arg(long)]
        dry_run: bool,

        /// Cycle interval in seconds (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Evaluate every symbol once and print the snapshot
    Scan {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/scalping.json")]
        config: String,

        /// Symbols to scan (comma-separated). E.g., "BTCUSDT,ETHUSDT"
        #[arg(short, long)]
        symbols: Option<String>,
    },

    /// Force-evaluate all pending signals now
    Resolve {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/scalping.json")]
        config: String,
    },

    /// Show performance statistics of stored signals
    Stats {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/scalping.json")]
        config: String,

        /// Look-back window in days
        #[arg(short, long, default_value = "7")]
        days: i64,
    },

    /// Export stored signals to CSV
    Export {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/scalping.json")]
        config: String,

        /// Output CSV file
        #[arg(short, long, default_value = "signals.csv")]
        output: String,

        /// Look-back window in days
        #[arg(short, long, default_value = "30")]
        days: i64,
    },
}

fn setup_logging(verbose: bool, json: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy HTTP crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if json {
        let console_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stdout);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Scan { .. } => "scan",
        Commands::Resolve { .. } => "resolve",
        Commands::Stats { .. } => "stats",
        Commands::Export { .. } => "export",
    };

    // .env before config so overrides are visible
    dotenv::dotenv().ok();
    setup_logging(cli.verbose, cli.json_logs, command_name)?;

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            interval,
        } => commands::run::run(config, dry_run, interval),
        Commands::Scan { config, symbols } => commands::scan::run(config, symbols),
        Commands::Resolve { config } => commands::resolve::run(config),
        Commands::Stats { config, days } => commands::stats::run(config, days),
        Commands::Export {
            config,
            output,
            days,
        } => commands::export::run(config, output, days),
    }
}
