//! tether - harness for the engine boundary
//!
//! Writes host configuration, checks that a host can be brought up and
//! called into, and drives worker threads against an in-process engine.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tether_hostcall::HostConfig;

/// Engine boundary harness
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about = "Exercise the tether engine boundary")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Host configuration file
    #[arg(long, global = true, default_value = "tether.toml")]
    config: PathBuf,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default tether.toml
    Init(commands::init::InitArgs),

    /// Check configuration and a host round trip
    Doctor(commands::doctor::DoctorArgs),

    /// Drive worker threads against an in-process engine host
    Simulate(commands::simulate::SimulateArgs),
}

/// Config file if present, defaults otherwise. A broken file is reported by
/// `doctor`, so here it only falls back.
fn load_config(path: &Path) -> HostConfig {
    if !path.exists() {
        return HostConfig::default();
    }
    HostConfig::load(path).unwrap_or_else(|e| {
        eprintln!("warning: {}: {}, using defaults", path.display(), e);
        HostConfig::default()
    })
}

fn init_logging(config: &HostConfig, verbose: u8, quiet: bool) {
    let filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => config.log.filter.as_str(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config);
    init_logging(&config, cli.verbose, cli.quiet);

    // Determine if colors should be used
    let use_color = !cli.no_color && !cli.quiet && atty::is(atty::Stream::Stdout);

    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Init(args) => commands::init::run(args, &cli.config, cli.format),
        Commands::Doctor(args) => commands::doctor::run(args, &cli.config, cli.format, use_color, cli.quiet),
        Commands::Simulate(args) => {
            commands::simulate::run(args, config, cli.format, use_color, cli.quiet)
        }
    }
}
