//! CLI entry point.
//!
//! Runs the synchronization engine against the local compositor and
//! prints each published snapshot as plain text, one line per workspace.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use swaytasks::{
    socket_path, spawn_registry_watcher, AppInfoCache, DesktopDatabase, IdentityResolver,
    SwayIpc, TaskService, TaskSnapshot,
};
use swaytasks_core::{logging, Config, DEFAULT_CONFIG_TOML};

#[derive(Debug, Parser)]
#[command(
    name = "swaytasks",
    about = "Track sway workspaces and windows with resolved application identities"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if cli.print_default_config {
        print!("{}", DEFAULT_CONFIG_TOML);
        return ExitCode::SUCCESS;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("swaytasks: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = Config::load(cli.config.as_deref())?;
    let config = loaded.config;

    let database = Arc::new(DesktopDatabase::system(&config.apps.extra_data_dirs));
    let cache = Arc::new(AppInfoCache::new(database.clone()));
    let _watcher = if config.apps.watch {
        spawn_registry_watcher(cache.clone())
    } else {
        None
    };
    let resolver = IdentityResolver::new(database, cache);

    let path = socket_path(config.ipc.socket.as_deref())?;
    let ipc = SwayIpc::connect(path)?;
    let service = TaskService::start(ipc, resolver);

    service.connect(print_snapshot);
    info!("swaytasks running");

    loop {
        std::thread::park();
    }
}

fn print_snapshot(snapshot: &TaskSnapshot) {
    println!("---");
    for workspace in &snapshot.workspaces {
        let mark = if workspace.props.focused {
            '*'
        } else if workspace.props.urgent {
            '!'
        } else if workspace.props.visible {
            '+'
        } else {
            ' '
        };
        let apps: Vec<&str> = workspace
            .windows
            .iter()
            .filter(|w| w.first_of_identity)
            .map(|w| w.identity.desktop_id())
            .collect();
        println!("{}{}: {}", mark, workspace.props.title, apps.join(", "));
    }
}
