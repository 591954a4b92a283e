//! Configuration management for domainwatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `domainwatch.toml` file, environment variables
//! and command-line arguments.

use crate::cli::Cli;
use crate::core::Plan;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file, read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "domainwatch.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub core: CoreConfig,
    pub server: ServerConfig,
    pub probe: ProbeConfig,
    pub batch: BatchConfig,
    pub email: EmailConfig,
    pub webhook: WebhookConfig,
    pub quota: QuotaConfig,
    pub store: StoreConfig,
    pub metrics: MetricsConfig,
}

/// General application settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoreConfig {
    /// The logging level for the application.
    pub log_level: String,
    /// Link included in every notification.
    pub dashboard_url: String,
}

/// Configuration for the HTTP server.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    /// Bearer token required by the batch trigger endpoint.
    pub cron_secret: Option<String>,
    /// Bearer token required by the on-demand endpoints.
    pub api_token: Option<String>,
}

/// Configuration for the TLS and WHOIS probes.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProbeConfig {
    pub tls_port: u16,
    pub tls_timeout_ms: u64,
    pub whois_port: u16,
    pub whois_timeout_ms: u64,
    /// Root server asked for the registry WHOIS server of a TLD.
    pub whois_root_server: String,
    /// Query this server (`host` or `host:port`) directly instead of following referrals.
    pub whois_server_override: Option<String>,
}

impl ProbeConfig {
    pub fn tls_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_timeout_ms)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_millis(self.whois_timeout_ms)
    }
}

/// Configuration for batch runs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BatchConfig {
    /// How many domains are processed at the same time.
    pub concurrency: usize,
    /// When set, `serve` also triggers a batch run on this interval.
    pub interval_seconds: Option<u64>,
}

/// Configuration for the email channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmailConfig {
    /// Sender mailbox, e.g. `domainwatch <alerts@example.com>`.
    pub from: String,
    /// Without SMTP settings, emails are written to the log instead.
    pub smtp: Option<SmtpConfig>,
}

/// SMTP relay settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}

/// Configuration for the webhook channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WebhookConfig {
    pub timeout_ms: u64,
}

/// Domain quota per plan. `None` means unlimited.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QuotaConfig {
    pub free: Option<usize>,
    pub pro: Option<usize>,
    pub agency: Option<usize>,
}

impl QuotaConfig {
    pub fn limit_for(&self, plan: Plan) -> Option<usize> {
        match plan {
            Plan::Free => self.free,
            Plan::Pro => self.pro,
            Plan::Agency => self.agency,
        }
    }
}

/// Which built-in store to use.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// A SQLite file at `database_path`.
    #[default]
    Sqlite,
    /// Process memory. The alert ledger is lost on exit.
    Memory,
}

/// Configuration for the built-in store.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_path: PathBuf,
    /// YAML file with the accounts and domains to load at startup.
    pub seed_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: PathBuf::from("domainwatch.db"),
            seed_file: None,
        }
    }
}

impl StoreConfig {
    /// Whether the alert ledger outlives the process.
    pub fn is_durable(&self) -> bool {
        self.backend != StoreBackend::Memory
    }
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file,
    /// environment variables and command-line arguments.
    ///
    /// Environment variables use the `DOMAINWATCH_` prefix and `__` for
    /// nesting, e.g. `DOMAINWATCH_BATCH__CONCURRENCY=8`.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    bail!("Configuration file not found: {}", path.display());
                }
                path.clone()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("DOMAINWATCH_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch.concurrency == 0 {
            bail!("batch.concurrency must be at least 1");
        }
        if self.batch.interval_seconds == Some(0) {
            bail!("batch.interval_seconds must be greater than 0");
        }
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig {
                log_level: "info".to_string(),
                dashboard_url: "http://localhost:8080/dashboard".to_string(),
            },
            server: ServerConfig {
                listen_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
                cron_secret: None,
                api_token: None,
            },
            probe: ProbeConfig {
                tls_port: 443,
                tls_timeout_ms: 5_000,
                whois_port: 43,
                whois_timeout_ms: 10_000,
                whois_root_server: "whois.iana.org".to_string(),
                whois_server_override: None,
            },
            batch: BatchConfig {
                concurrency: 4,
                interval_seconds: None,
            },
            email: EmailConfig {
                from: "domainwatch <alerts@localhost>".to_string(),
                smtp: None,
            },
            webhook: WebhookConfig { timeout_ms: 10_000 },
            quota: QuotaConfig {
                free: Some(3),
                pro: Some(20),
                agency: None,
            },
            store: StoreConfig::default(),
            metrics: MetricsConfig { enabled: true },
        }
    }
}
