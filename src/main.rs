mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "splitc")]
#[command(about = "Split bills from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/splitc/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(long)]
  url: Option<String>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
  /// List bills others owe me
  Owed,
  /// List bills I owe
  Owe,
  /// Show one bill with its participants
  Show { id: String },
  /// Create a bill
  Add(app::AddArgs),
  /// Update one of my bills
  Edit(app::EditArgs),
  /// Delete one of my bills
  Rm { id: String },
  /// Keep refreshing in the background and print changes
  Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.url {
    config.api.url = url;
  }

  let _log_guard = logging::init(&config.log, args.verbose)?;

  let app = app::App::new(config)?;
  match args.command {
    CliCommand::Owed => app.owed().await,
    CliCommand::Owe => app.owe().await,
    CliCommand::Show { id } => app.show(&id).await,
    CliCommand::Add(add) => app.add(add).await,
    CliCommand::Edit(edit) => app.edit(edit).await,
    CliCommand::Rm { id } => app.remove(&id).await,
    CliCommand::Watch => app.watch().await,
  }
}
