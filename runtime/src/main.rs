// Copyright 2026 Feargreed Contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use feargreed_runtime::cli;
use feargreed_runtime::config::{Config, Overrides};

#[derive(Parser)]
#[command(
    name = "feargreed",
    about = "Feargreed: scrape the Fear & Greed gauge into a rolling history file",
    version,
    after_help = "Run 'feargreed <command> --help' for details on each command.\nRun 'feargreed' with no command to fetch one reading."
)]
struct Cli {
    /// Output results as JSON (machine-readable), and log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG wins if set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Page to scrape
    #[arg(long, global = true)]
    url: Option<String>,

    /// History file to update
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Where to write the diagnostic screenshot
    #[arg(long, global = true)]
    screenshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one reading and append it to the history file (default)
    Run,
    /// Print the stored history
    Show,
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json);

    let config = Config::resolve(&Overrides {
        url: cli.url,
        data: cli.data,
        screenshot: cli.screenshot,
    });

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cli::run_cmd::run(&config, cli.json).await,
        Commands::Show => cli::show_cmd::run(&config.data_path, cli.json).await,
        Commands::Doctor => cli::doctor::run(&config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "feargreed", &mut std::io::stdout());
            Ok(())
        }
    };

    // Schedulers only see the exit status: 0 = reading stored, 1 = anything else.
    if let Err(e) = &result {
        tracing::error!("{e:#}");
        if cli.json {
            println!(
                "{}",
                serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                })
            );
        }
        std::process::exit(1);
    }

    result
}
