//! # mkflow CLI Entry Point
//!
//! This is the main executable for the `mkflow` command-line tool.
//! It parses CLI arguments using clap and routes commands to the appropriate handlers.
//!
//! ## Command Structure
//!
//! - **Workflow**: `run`, `render`, `missing`
//! - **Diagnostics**: `probe`
//! - **Shell**: `completion`

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mkflow::commands;
use mkflow::config::DEFAULT_CONFIG;

#[derive(Parser)]
#[command(name = "mkflow")]
#[command(about = "Author and run Make-driven workflows", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Show debug logs (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Make program to probe and run (overrides the workflow file)
    #[arg(long, global = true)]
    make: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workflow document and run it with make
    Run {
        /// Workflow file
        #[arg(default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Number of parallel jobs
        #[arg(short, long)]
        jobs: Option<u32>,
        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,
        /// Enable make's debug output
        #[arg(long)]
        debug: bool,
        /// Stop at the first failing step
        #[arg(long)]
        stop_on_error: bool,
        /// Re-run every step
        #[arg(short = 'B', long)]
        force: bool,
        /// Run the clean target instead
        #[arg(long)]
        clean: bool,
        /// Extra arguments passed to make
        #[arg(last = true)]
        make_args: Vec<String>,
    },
    /// Print the generated workflow document
    Render {
        /// Workflow file
        #[arg(default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// List outputs that are missing or out of date
    Missing {
        /// Workflow file
        #[arg(default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Show the make version and the rule encoding it supports
    Probe,
    /// Generate shell completion scripts
    Completion { shell: Shell },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("mkflow=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let make = cli.make.as_deref();

    match &cli.command {
        Commands::Run {
            config,
            jobs,
            dry_run,
            debug,
            stop_on_error,
            force,
            clean,
            make_args,
        } => {
            let overrides = commands::flow::RunOverrides {
                jobs: *jobs,
                dry_run: *dry_run,
                debug: *debug,
                stop_on_error: *stop_on_error,
                force: *force,
                clean: *clean,
                extra_args: make_args.clone(),
            };
            let code = commands::flow::run_flow(config, make, &overrides)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Render { config } => commands::flow::render_flow(config, make),
        Commands::Missing { config } => {
            let code = commands::flow::list_missing(config, make)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Probe => commands::doctor::run_probe(make.unwrap_or("make")),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    }
}
