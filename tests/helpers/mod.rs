//! Shared fakes for the integration tests.
#![allow(dead_code)]

pub mod fake_probe;
pub mod fake_store;
pub mod recording_sender;

use domainwatch::batch::BatchRunner;
use domainwatch::core::{AccountId, CertificateProbe, DomainStore, MonitoredDomain, Plan, RegistrationProbe};
use domainwatch::internal_metrics::Metrics;
use domainwatch::notification::Dispatcher;
use domainwatch::probe::Prober;
use domainwatch::store::MemoryStore;
use fake_probe::{FakeCertProbe, FakeRegistrationProbe};
use recording_sender::{RecordingEmailSender, RecordingWebhookSender};
use std::sync::Arc;
use uuid::Uuid;

pub const DASHBOARD_URL: &str = "https://domainwatch.test/dashboard";

/// Everything a batch test needs to drive and inspect a run.
pub struct Harness {
    pub store: Arc<dyn DomainStore>,
    pub runner: BatchRunner,
    pub email: Arc<RecordingEmailSender>,
    pub webhook: Arc<RecordingWebhookSender>,
}

pub fn dispatcher(email: Arc<RecordingEmailSender>, webhook: Arc<RecordingWebhookSender>) -> Dispatcher {
    Dispatcher::new(email, webhook, DASHBOARD_URL.to_string())
}

/// Wires a `BatchRunner` around the given store and probes.
pub fn harness(
    store: Arc<dyn DomainStore>,
    cert: FakeCertProbe,
    registration: FakeRegistrationProbe,
    concurrency: usize,
) -> Harness {
    let email = Arc::new(RecordingEmailSender::new());
    let webhook = Arc::new(RecordingWebhookSender::new());
    let cert: Arc<dyn CertificateProbe> = Arc::new(cert);
    let registration: Arc<dyn RegistrationProbe> = Arc::new(registration);
    let runner = BatchRunner::new(
        store.clone(),
        Prober::new(cert, registration),
        dispatcher(email.clone(), webhook.clone()),
        concurrency,
        Metrics::disabled(),
    );
    Harness {
        store,
        runner,
        email,
        webhook,
    }
}

/// Creates an account with an email address and the given domains.
pub async fn account_with_domains(
    store: &MemoryStore,
    email: Option<&str>,
    names: &[&str],
) -> (AccountId, Vec<MonitoredDomain>) {
    let account = Uuid::new_v4();
    store.add_account(account, email, Plan::Pro).await;
    let mut domains = Vec::with_capacity(names.len());
    for name in names {
        let domain = store
            .insert_domain(MonitoredDomain::new(account, name))
            .await
            .expect("insert domain");
        domains.push(domain);
    }
    (account, domains)
}
