//! Probes that answer from a fixed table instead of the network.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use domainwatch::core::{
    CertProbeResult, CertificateProbe, RegistrationProbe, RegistrationProbeResult,
};
use domainwatch::status::classify;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Expiry `days` whole days from now. The extra hours keep the day count
/// stable for the duration of a test.
fn expiry_in(days: i64) -> chrono::DateTime<Utc> {
    Utc::now() + Duration::days(days) + Duration::hours(6)
}

/// Answers with a certificate expiring a fixed number of days from now.
/// Domains without an entry fail with a connection error.
#[derive(Default, Clone)]
pub struct FakeCertProbe {
    days: HashMap<String, i64>,
    calls: Arc<AtomicUsize>,
}

impl FakeCertProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: &str, days: i64) -> Self {
        self.days.insert(domain.to_string(), days);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateProbe for FakeCertProbe {
    async fn probe(&self, domain: &str) -> CertProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.days.get(domain) {
            Some(&days) => CertProbeResult {
                expiry: Some(expiry_in(days)),
                days_remaining: Some(days),
                status: classify(days),
                issuer: Some("Test CA".to_string()),
                error: None,
            },
            None => CertProbeResult::failed("connection failed: connection refused"),
        }
    }
}

/// Answers with a registration expiring a fixed number of days from now.
/// Domains without an entry fail the way a WHOIS timeout does.
#[derive(Default, Clone)]
pub struct FakeRegistrationProbe {
    days: HashMap<String, i64>,
}

impl FakeRegistrationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: &str, days: i64) -> Self {
        self.days.insert(domain.to_string(), days);
        self
    }
}

#[async_trait]
impl RegistrationProbe for FakeRegistrationProbe {
    async fn probe(&self, domain: &str) -> RegistrationProbeResult {
        match self.days.get(domain) {
            Some(&days) => RegistrationProbeResult {
                expiry: Some(expiry_in(days)),
                days_remaining: Some(days),
                status: classify(days),
                registrar: Some("Test Registrar".to_string()),
                error: None,
            },
            None => RegistrationProbeResult::failed("WHOIS lookup timed out after 10000ms", None),
        }
    }
}
