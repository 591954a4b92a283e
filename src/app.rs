//! The main application logic, decoupled from the entry point.

use crate::{
    api::{self, AppState},
    batch::{BatchRunner, RunSummary},
    checker::Checker,
    config::{Config, StoreBackend, StoreConfig},
    core::{CertificateProbe, DomainStore, EmailSender, RegistrationProbe, WebhookSender},
    internal_metrics::{Metrics, MetricsBuilder},
    notification::{Dispatcher, HttpWebhookSender, LogEmailSender, SmtpEmailSender},
    probe::{Prober, TlsCertificateProbe, WhoisRegistrationProbe},
    store::{MemoryStore, SeedData, SqliteStore},
    task_manager::TaskManager,
};
use anyhow::{bail, Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    local_addr: SocketAddr,
    services: Services,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// The wired-up services, shared by the HTTP server, the scheduler and the
/// one-shot commands.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DomainStore>,
    pub prober: Prober,
    pub dispatcher: Dispatcher,
    pub batch: BatchRunner,
    pub checker: Checker,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Builder for the main application.
///
/// This pattern allows for a clean separation of concerns between constructing
/// the application's components and running the application. It also provides
/// a convenient way to override components for testing purposes.
pub struct AppBuilder {
    config: Config,
    store_override: Option<Arc<dyn DomainStore>>,
    cert_probe_override: Option<Arc<dyn CertificateProbe>>,
    registration_probe_override: Option<Arc<dyn RegistrationProbe>>,
    email_sender_override: Option<Arc<dyn EmailSender>>,
    webhook_sender_override: Option<Arc<dyn WebhookSender>>,
    metrics_override: Option<(Metrics, Option<PrometheusHandle>)>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store_override: None,
            cert_probe_override: None,
            registration_probe_override: None,
            email_sender_override: None,
            webhook_sender_override: None,
            metrics_override: None,
        }
    }

    pub fn store_override(mut self, store: Arc<dyn DomainStore>) -> Self {
        self.store_override = Some(store);
        self
    }

    pub fn cert_probe_override(mut self, probe: Arc<dyn CertificateProbe>) -> Self {
        self.cert_probe_override = Some(probe);
        self
    }

    pub fn registration_probe_override(mut self, probe: Arc<dyn RegistrationProbe>) -> Self {
        self.registration_probe_override = Some(probe);
        self
    }

    pub fn email_sender_override(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email_sender_override = Some(sender);
        self
    }

    pub fn webhook_sender_override(mut self, sender: Arc<dyn WebhookSender>) -> Self {
        self.webhook_sender_override = Some(sender);
        self
    }

    pub fn metrics_override(mut self, metrics: Metrics, handle: Option<PrometheusHandle>) -> Self {
        self.metrics_override = Some((metrics, handle));
        self
    }

    /// Constructs every service without starting any task.
    pub fn build_services(&mut self) -> Result<Services> {
        let config = &self.config;

        let store: Arc<dyn DomainStore> = match self.store_override.take() {
            Some(store) => store,
            None => open_store(&config.store)?,
        };

        let cert_probe: Arc<dyn CertificateProbe> = match self.cert_probe_override.take() {
            Some(probe) => probe,
            None => Arc::new(
                TlsCertificateProbe::new(config.probe.tls_port, config.probe.tls_timeout())
                    .context("Failed to build TLS connector")?,
            ),
        };
        let registration_probe: Arc<dyn RegistrationProbe> =
            match self.registration_probe_override.take() {
                Some(probe) => probe,
                None => Arc::new(WhoisRegistrationProbe::new(&config.probe)),
            };
        let prober = Prober::new(cert_probe, registration_probe);

        let email_sender: Arc<dyn EmailSender> = match self.email_sender_override.take() {
            Some(sender) => sender,
            None => match &config.email.smtp {
                Some(smtp) => Arc::new(
                    SmtpEmailSender::new(&config.email.from, smtp)
                        .context("Failed to configure SMTP transport")?,
                ),
                None => {
                    warn!("No SMTP relay configured, alert emails will only be logged");
                    Arc::new(LogEmailSender)
                }
            },
        };
        let webhook_sender: Arc<dyn WebhookSender> = match self.webhook_sender_override.take() {
            Some(sender) => sender,
            None => Arc::new(
                HttpWebhookSender::new(Duration::from_millis(config.webhook.timeout_ms))
                    .context("Failed to build webhook HTTP client")?,
            ),
        };
        let dispatcher = Dispatcher::new(
            email_sender,
            webhook_sender,
            config.core.dashboard_url.clone(),
        );

        let (metrics, metrics_handle) = match self.metrics_override.take() {
            Some(override_) => override_,
            None => MetricsBuilder::new(config.metrics.clone()).build(),
        };

        let batch = BatchRunner::new(
            store.clone(),
            prober.clone(),
            dispatcher.clone(),
            config.batch.concurrency,
            metrics,
        );
        let checker = Checker::new(store.clone(), prober.clone(), config.quota.clone());

        Ok(Services {
            store,
            prober,
            dispatcher,
            batch,
            checker,
            metrics_handle,
        })
    }

    /// Runs a single batch and returns its summary.
    ///
    /// Refuses to run against the in-memory store: its ledger dies with the
    /// process, so a repeated invocation would notify again for the same day.
    pub async fn run_once(mut self) -> Result<RunSummary> {
        if self.store_override.is_none() && !self.config.store.is_durable() {
            bail!(
                "run-once needs a durable store, set store.backend = \"sqlite\" \
                 (the in-memory alert ledger would be lost after this run)"
            );
        }
        let services = self.build_services()?;
        Ok(services.batch.run().await?)
    }

    /// Builds the application and starts the HTTP server and, if configured,
    /// the interval scheduler.
    #[instrument(skip_all)]
    pub async fn build(mut self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let services = self.build_services()?;
        let task_manager = TaskManager::new(shutdown_rx);

        let listener = TcpListener::bind(self.config.server.listen_address)
            .await
            .with_context(|| {
                format!(
                    "Failed to bind HTTP server to {}",
                    self.config.server.listen_address
                )
            })?;
        let local_addr = listener.local_addr()?;

        if self.config.server.cron_secret.is_none() {
            warn!("server.cron_secret is not set, the batch trigger endpoint will reject every request");
        }
        if self.config.server.api_token.is_none() {
            warn!("server.api_token is not set, the on-demand endpoints will reject every request");
        }

        let state = AppState {
            batch: services.batch.clone(),
            checker: services.checker.clone(),
            dispatcher: services.dispatcher.clone(),
            cron_secret: self.config.server.cron_secret.clone(),
            api_token: self.config.server.api_token.clone(),
            metrics: services.metrics_handle.clone(),
        };
        let router = api::router(state);
        let mut server_shutdown = task_manager.get_shutdown_rx();
        task_manager.spawn("http-server", async move {
            let shutdown = async move {
                if !*server_shutdown.borrow() {
                    server_shutdown.changed().await.ok();
                }
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "HTTP server error");
            }
        });
        info!(address = %local_addr, "HTTP server listening");

        if let Some(seconds) = self.config.batch.interval_seconds {
            let batch = services.batch.clone();
            let shutdown = task_manager.get_shutdown_rx();
            task_manager.spawn(
                "scheduler",
                run_scheduler(batch, Duration::from_secs(seconds), shutdown),
            );
            info!(interval_seconds = seconds, "Batch scheduler started");
        }

        Ok(App {
            task_manager,
            local_addr,
            services,
        })
    }
}

/// Opens the configured built-in store and applies the seed file, if any.
fn open_store(config: &StoreConfig) -> Result<Arc<dyn DomainStore>> {
    match config.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.database_path).with_context(|| {
                format!("Failed to open database {}", config.database_path.display())
            })?;
            if let Some(path) = &config.seed_file {
                let seed = SeedData::from_file(path)
                    .with_context(|| format!("Failed to load seed file {}", path.display()))?;
                let added = store.apply_seed(seed).context("Failed to apply seed data")?;
                info!(path = %path.display(), added, "Applied seed data");
            }
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store, the alert ledger will not survive a restart");
            match &config.seed_file {
                Some(path) => Ok(Arc::new(MemoryStore::from_seed_file(path).with_context(
                    || format!("Failed to load seed file {}", path.display()),
                )?)),
                None => Ok(Arc::new(MemoryStore::new())),
            }
        }
    }
}

/// Triggers a batch run every `period` until shutdown. The first run starts
/// immediately.
async fn run_scheduler(batch: BatchRunner, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                info!("Scheduler received shutdown signal.");
                break;
            }
            _ = ticker.tick() => {
                match batch.run().await {
                    Ok(summary) => info!(
                        checked = summary.checked,
                        alerts_sent = summary.alerts_sent,
                        "Scheduled batch run finished"
                    ),
                    Err(e) => error!(error = %e, "Scheduled batch run failed"),
                }
            }
        }
    }
}
