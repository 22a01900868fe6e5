// CLI module - command-line argument parsing and handlers
//
// `clap` subcommands for inspecting the ambient `AppConfig` bootstrap file
// and the persisted `ConfigDocument` (profiles/proxy settings) the Router
// routes against.

use clap::{Parser, Subcommand};

use crate::config::{AppConfig, ConfigStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "reasoning-proxy")]
#[command(version = VERSION)]
#[command(about = "Local reverse proxy that hides reasoning chains-of-thought from OpenAI-compatible clients", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or edit the bootstrap config file (~/.config/reasoning-proxy/config.toml)
    Config {
        /// Show effective bootstrap configuration
        #[arg(long)]
        show: bool,

        /// Show the bootstrap config file path
        #[arg(long)]
        path: bool,
    },
    /// Inspect the persisted routing document (profiles, proxy settings)
    Profiles {
        /// List configured profiles
        #[arg(long)]
        list: bool,
    },
}

/// Handle CLI commands. Returns true if a command was handled (exit after).
pub fn handle_cli() -> bool {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { show, path }) => {
            if path {
                handle_config_path();
            } else if show {
                handle_config_show();
            } else {
                println!("Usage: reasoning-proxy config [--show|--path]");
            }
            true
        }
        Some(Commands::Profiles { list }) => {
            if list {
                handle_profiles_list();
            } else {
                println!("Usage: reasoning-proxy profiles [--list]");
            }
            true
        }
        None => false, // No subcommand, run normal proxy
    }
}

fn handle_config_path() {
    match AppConfig::bootstrap_file_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: could not determine a home directory for the bootstrap config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = AppConfig::from_env();
    println!("# Effective bootstrap configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
}

fn handle_profiles_list() {
    let config = AppConfig::from_env();
    let store = match ConfigStore::load(config.config_doc_path.clone()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error loading {}: {e}", config.config_doc_path.display());
            std::process::exit(1);
        }
    };
    let snapshot = store.profiles().snapshot();
    let default_id = snapshot.default_profile().map(|p| p.id.clone());
    if snapshot.all().is_empty() {
        println!("No profiles configured.");
        return;
    }
    for profile in snapshot.all() {
        let marker = if Some(&profile.id) == default_id.as_ref() { "*" } else { " " };
        println!(
            "{marker} {:<12} {:<20} patterns={:?} priority={} enabled={}",
            profile.id, profile.name, profile.model_patterns, profile.priority, profile.enabled
        );
    }
}
