//! The check-all-domains batch run.
//!
//! A run lists every monitored domain, probes each one, persists the fresh
//! status and a history snapshot, and then evaluates certificate and
//! registration expiry against the alert tiers. Nothing that goes wrong for a
//! single domain stops the run; only failing to list the domains is fatal.

use crate::core::{
    AccountContact, AccountId, AlertKind, AlertNotice, DomainStore, MonitoredDomain,
};
use crate::deduplication::DedupLedger;
use crate::internal_metrics::Metrics;
use crate::notification::Dispatcher;
use crate::probe::Prober;
use crate::status::{days_until, match_threshold};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("failed to list domains: {0}")]
    ListDomains(#[source] StoreError),
}

/// What a batch run reports back to its trigger.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub checked: usize,
    pub alerts_sent: usize,
    pub log: Vec<String>,
}

/// Result of processing one domain.
#[derive(Debug, Default)]
struct DomainOutcome {
    lines: Vec<String>,
    alerts_sent: usize,
}

impl DomainOutcome {
    fn push(&mut self, line: String) {
        // Mirror every run log line as a structured event.
        if line.starts_with("[ERROR]") || line.starts_with("[INCONSISTENT]") {
            warn!(target: "domainwatch::batch::log", "{}", line);
        } else {
            info!(target: "domainwatch::batch::log", "{}", line);
        }
        self.lines.push(line);
    }
}

/// Contacts looked up during one run, keyed by account.
type ContactCache = Cache<AccountId, AccountContact>;

#[derive(Clone)]
pub struct BatchRunner {
    store: Arc<dyn DomainStore>,
    prober: Prober,
    dispatcher: Dispatcher,
    ledger: DedupLedger,
    concurrency: usize,
    metrics: Metrics,
}

impl BatchRunner {
    pub fn new(
        store: Arc<dyn DomainStore>,
        prober: Prober,
        dispatcher: Dispatcher,
        concurrency: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger: DedupLedger::new(store.clone()),
            store,
            prober,
            dispatcher,
            concurrency: concurrency.max(1),
            metrics,
        }
    }

    /// Runs one batch over every monitored domain.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunSummary, BatchError> {
        let started = Instant::now();
        let domains = self.store.list_domains().await.map_err(|e| {
            error!(error = %e, "Batch run aborted: cannot list domains");
            BatchError::ListDomains(e)
        })?;

        let checked = domains.len();
        let mut log = Vec::with_capacity(checked * 3 + 2);
        let start_line = format!("[START] Checking {} domain(s)", checked);
        info!(target: "domainwatch::batch::log", "{}", start_line);
        log.push(start_line);

        // Scoped to this run: contacts are re-read on the next one.
        let contacts: ContactCache = Cache::builder().build();

        // `buffered` keeps the log in domain order while still running up to
        // `concurrency` domains at once.
        let outcomes: Vec<DomainOutcome> = stream::iter(domains)
            .map(|domain| {
                let runner = self.clone();
                let contacts = contacts.clone();
                async move { runner.process_domain(domain, &contacts).await }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut alerts_sent = 0;
        for outcome in outcomes {
            alerts_sent += outcome.alerts_sent;
            log.extend(outcome.lines);
        }

        let done_line = format!(
            "[DONE] {} domain(s) checked, {} alert(s) sent",
            checked, alerts_sent
        );
        info!(target: "domainwatch::batch::log", "{}", done_line);
        log.push(done_line);

        self.metrics
            .batch_run_duration_seconds
            .record(started.elapsed().as_secs_f64());

        Ok(RunSummary {
            checked,
            alerts_sent,
            log,
        })
    }

    async fn process_domain(&self, domain: MonitoredDomain, contacts: &ContactCache) -> DomainOutcome {
        let mut outcome = DomainOutcome::default();
        let name = domain.name.clone();

        let report = self.prober.probe(&name).await;
        self.metrics.domains_checked_total.increment(1);

        let checked_at = Utc::now();
        let update = report.to_update(checked_at);
        let history = report.to_history(domain.id, checked_at);

        if let Err(e) = self.store.update_domain(domain.id, &update).await {
            outcome.push(format!("[ERROR] Update failed for {}: {}", name, e));
            return outcome;
        }
        if let Err(e) = self.store.insert_history(history).await {
            outcome.push(format!("[ERROR] History snapshot failed for {}: {}", name, e));
        }

        outcome.push(format!(
            "[CHECK] {}: SSL {}, Domain {}",
            name,
            days_label(report.cert.days_remaining),
            days_label(report.registration.days_remaining)
        ));

        let contact = match self.contact(domain.account_id, contacts).await {
            Ok(contact) => contact,
            Err(e) => {
                outcome.push(format!("[ERROR] Account lookup failed for {}: {}", name, e));
                return outcome;
            }
        };
        if contact.email.is_none() {
            outcome.push(format!("[SKIP] {}: no email address for account", name));
            return outcome;
        }

        let facets = [
            (AlertKind::CertExpiry, update.cert_expiry),
            (AlertKind::RegistrationExpiry, update.registration_expiry),
        ];
        for (kind, expiry) in facets {
            if let Some(expiry) = expiry {
                self.evaluate_alert(&domain, kind, expiry, checked_at, &contact, &mut outcome)
                    .await;
            }
        }
        outcome
    }

    /// Looks up an account's email and webhook preference once per run.
    async fn contact(
        &self,
        account_id: AccountId,
        contacts: &ContactCache,
    ) -> Result<AccountContact, Arc<StoreError>> {
        let store = self.store.clone();
        contacts
            .try_get_with(account_id, async move {
                let email = store.account_email(account_id).await?;
                let preference = store.notification_preference(account_id).await?;
                Ok::<_, StoreError>(AccountContact { email, preference })
            })
            .await
    }

    /// Threshold, dedup, dispatch and ledger write for one expiry facet.
    async fn evaluate_alert(
        &self,
        domain: &MonitoredDomain,
        kind: AlertKind,
        expiry: DateTime<Utc>,
        now: DateTime<Utc>,
        contact: &AccountContact,
        outcome: &mut DomainOutcome,
    ) {
        let name = &domain.name;
        let facet = kind.facet();
        let days = days_until(expiry, now);
        let Some(tier) = match_threshold(days) else {
            return;
        };

        match self.ledger.was_already_sent(domain.id, kind, tier, now).await {
            Ok(true) => {
                outcome.push(format!(
                    "[SKIP] {}: {} {}d alert already sent today",
                    name, facet, tier
                ));
                return;
            }
            Ok(false) => {}
            Err(e) => {
                outcome.push(format!(
                    "[ERROR] Ledger check failed for {} ({}): {}",
                    name, facet, e
                ));
                return;
            }
        }

        let notice = AlertNotice {
            domain_name: name.clone(),
            kind,
            days_remaining: days,
            expiry,
            dashboard_url: self.dispatcher.dashboard_url().to_string(),
        };
        let result = self.dispatcher.dispatch(&notice, contact).await;

        if let Err(e) = &result.email {
            outcome.push(format!(
                "[ERROR] Email failed for {} ({}, {}d): {}",
                name, facet, tier, e
            ));
        }
        match &result.webhook {
            Some(Ok(())) => outcome.push(format!("[WEBHOOK] {}: {} webhook sent", name, facet)),
            Some(Err(e)) => outcome.push(format!("[ERROR] Webhook failed for {}: {}", name, e)),
            None => {}
        }

        // Nothing was delivered: leave the ledger alone so the next run retries.
        if !result.any_succeeded() {
            return;
        }

        let recipient = match (&result.email, &contact.email) {
            (Ok(()), Some(email)) => email.as_str(),
            _ => "webhook",
        };
        outcome.alerts_sent += 1;
        outcome.push(format!(
            "[SENT] {}: {} expires in {}d (tier {}d) -> {}",
            name, facet, days, tier, recipient
        ));

        if let Err(e) = self.ledger.record(domain.id, kind, tier, now).await {
            self.metrics.ledger_errors_total.increment(1);
            outcome.push(format!(
                "[INCONSISTENT] {}: {} {}d alert delivered but not recorded: {}",
                name, facet, tier, e
            ));
        }
    }
}

fn days_label(days: Option<i64>) -> String {
    match days {
        Some(d) => format!("{}d", d),
        None => "?".to_string(),
    }
}
