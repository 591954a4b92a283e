//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `domainwatch.toml` file and environment variables.

use clap::{Parser, Subcommand};
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Watches TLS certificate and domain registration expiry and sends alerts.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The logging level (e.g. "info", "debug").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Address the HTTP server listens on.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Number of domains processed at the same time during a batch run.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// YAML file with the accounts and domains to load at startup.
    #[arg(long, value_name = "FILE")]
    pub seed_file: Option<PathBuf>,

    /// SQLite database holding domains, history and the alert ledger.
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP server (and the interval scheduler, if configured).
    Serve,
    /// Run a single batch over all domains and print the summary as JSON.
    RunOnce,
    /// Probe one domain and print the result as JSON.
    Check {
        /// The domain to probe.
        domain: String,
    },
}

#[derive(Serialize, Default)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    core: Option<CoreOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<ServerOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch: Option<BatchOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<StoreOverrides>,
}

#[derive(Serialize)]
struct CoreOverrides {
    log_level: String,
}

#[derive(Serialize)]
struct ServerOverrides {
    listen_address: SocketAddr,
}

#[derive(Serialize)]
struct BatchOverrides {
    concurrency: usize,
}

#[derive(Serialize)]
struct StoreOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    seed_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_path: Option<PathBuf>,
}

impl Cli {
    /// The subcommand to run; `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            core: self.log_level.clone().map(|log_level| CoreOverrides { log_level }),
            server: self.listen.map(|listen_address| ServerOverrides { listen_address }),
            batch: self.concurrency.map(|concurrency| BatchOverrides { concurrency }),
            store: (self.seed_file.is_some() || self.database.is_some()).then(|| StoreOverrides {
                seed_file: self.seed_file.clone(),
                database_path: self.database.clone(),
            }),
        }
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Serialized::defaults(self.overrides()).data()
    }
}
