use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod app;
mod builtin;
mod commands;
mod logging;

use app::App;
use commands::capability::{
    AddArgs, IdArgs, UpdateArgs, execute_add, execute_disable, execute_enable, execute_list,
    execute_remove, execute_show, execute_update,
};
use commands::types::execute_types;

/// Capsule Command Line Interface
///
/// Manages persisted capabilities: pluggable behaviors that are validated,
/// stored with their secrets encrypted, and activated when their conditions
/// allow.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Capability storage file, overriding the configuration
    #[clap(long, global = true)]
    storage: Option<PathBuf>,

    /// Print JSON instead of text
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the known capability types
    Types,

    /// List capabilities
    List,

    /// Show one capability
    Show(IdArgs),

    /// Add a capability
    Add(AddArgs),

    /// Change the properties or notes of a capability
    Update(UpdateArgs),

    /// Enable a capability
    Enable(IdArgs),

    /// Disable a capability
    Disable(IdArgs),

    /// Remove a capability
    Remove(IdArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = app::load_config(cli.config.as_deref(), cli.storage)?;
    logging::init(&config.logging);

    let app = App::start(&config)?;
    let json = cli.json;
    let result = match &cli.command {
        Commands::Types => execute_types(&app, json),
        Commands::List => execute_list(&app, json),
        Commands::Show(args) => execute_show(&app, args, json),
        Commands::Add(args) => execute_add(&app, args, json),
        Commands::Update(args) => execute_update(&app, args, json),
        Commands::Enable(args) => execute_enable(&app, args, json),
        Commands::Disable(args) => execute_disable(&app, args, json),
        Commands::Remove(args) => execute_remove(&app, args, json),
    };
    app.stop();
    result
}
