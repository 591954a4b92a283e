//! The probe layer: TLS certificate and WHOIS registration checks.
//!
//! Probes never return errors to their callers. Every failure (timeout,
//! unreachable host, handshake failure, missing WHOIS data) is folded into a
//! result with `ProbeStatus::Error` and a message, so that a batch over many
//! domains is never aborted by one bad probe.

pub mod tls;
pub mod whois;

use crate::config::ProbeConfig;
use crate::core::{
    CertificateProbe, CheckHistoryRecord, DomainId, DomainProbeReport, DomainUpdate, ProbeStatus,
    RegistrationProbe,
};
use crate::status::{to_cert_status, to_registration_status};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

pub use tls::TlsCertificateProbe;
pub use whois::WhoisRegistrationProbe;

/// Internal failure of a probe step. Converted into a result message at the
/// probe boundary.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{stage} timed out after {}ms", .after.as_millis())]
    Timeout { stage: &'static str, after: Duration },

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] native_tls::Error),

    #[error("certificate unavailable: {0}")]
    Certificate(String),

    #[error("WHOIS query failed: {0}")]
    Whois(String),
}

/// Runs both probes for a domain concurrently.
#[derive(Clone)]
pub struct Prober {
    cert: Arc<dyn CertificateProbe>,
    registration: Arc<dyn RegistrationProbe>,
}

impl Prober {
    pub fn new(cert: Arc<dyn CertificateProbe>, registration: Arc<dyn RegistrationProbe>) -> Self {
        Self { cert, registration }
    }

    /// Builds the network-backed probes from configuration.
    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        let cert = TlsCertificateProbe::new(config.tls_port, config.tls_timeout())?;
        let registration = WhoisRegistrationProbe::new(config);
        Ok(Self::new(Arc::new(cert), Arc::new(registration)))
    }

    /// Probes the certificate and the registration of `domain` in parallel.
    #[instrument(skip(self))]
    pub async fn probe(&self, domain: &str) -> DomainProbeReport {
        let (cert, registration) =
            tokio::join!(self.cert.probe(domain), self.registration.probe(domain));

        if cert.status == ProbeStatus::Error {
            metrics::counter!("probe_failures_total", "probe" => "tls").increment(1);
        }
        if registration.status == ProbeStatus::Error {
            metrics::counter!("probe_failures_total", "probe" => "whois").increment(1);
        }
        debug!(
            cert_status = ?cert.status,
            cert_days = ?cert.days_remaining,
            registration_status = ?registration.status,
            registration_days = ?registration.days_remaining,
            "Probe finished"
        );

        DomainProbeReport {
            domain: domain.to_string(),
            cert,
            registration,
        }
    }
}

impl DomainProbeReport {
    /// The status fields to persist for this report.
    pub fn to_update(&self, checked_at: DateTime<Utc>) -> DomainUpdate {
        DomainUpdate {
            cert_expiry: self.cert.expiry,
            cert_status: to_cert_status(self.cert.status),
            cert_issuer: self.cert.issuer.clone(),
            registration_expiry: self.registration.expiry,
            registration_status: to_registration_status(self.registration.status),
            registrar: self.registration.registrar.clone(),
            checked_at,
        }
    }

    /// The immutable history snapshot for this report.
    pub fn to_history(&self, domain_id: DomainId, checked_at: DateTime<Utc>) -> CheckHistoryRecord {
        CheckHistoryRecord::from_update(domain_id, &self.to_update(checked_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CertProbeResult, CertStatus, RegistrationProbeResult, RegistrationStatus};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct SlowCert {
        delay: Duration,
    }

    #[async_trait]
    impl CertificateProbe for SlowCert {
        async fn probe(&self, _domain: &str) -> CertProbeResult {
            tokio::time::sleep(self.delay).await;
            CertProbeResult {
                expiry: Some(Utc::now() + ChronoDuration::days(45)),
                days_remaining: Some(45),
                status: ProbeStatus::Healthy,
                issuer: Some("Test CA".to_string()),
                error: None,
            }
        }
    }

    struct SlowWhois {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RegistrationProbe for SlowWhois {
        async fn probe(&self, _domain: &str) -> RegistrationProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            RegistrationProbeResult::failed("WHOIS lookup timed out after 10000ms", None)
        }
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        let delay = Duration::from_millis(200);
        let whois = Arc::new(SlowWhois {
            delay,
            calls: AtomicUsize::new(0),
        });
        let prober = Prober::new(Arc::new(SlowCert { delay }), whois.clone());

        let start = Instant::now();
        let report = prober.probe("example.com").await;
        let elapsed = start.elapsed();

        assert!(elapsed < delay * 2, "probes should overlap, took {:?}", elapsed);
        assert_eq!(whois.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.domain, "example.com");
        assert_eq!(report.cert.status, ProbeStatus::Healthy);
        assert_eq!(report.registration.status, ProbeStatus::Error);
    }

    #[tokio::test]
    async fn test_report_maps_to_public_statuses() {
        let prober = Prober::new(
            Arc::new(SlowCert {
                delay: Duration::ZERO,
            }),
            Arc::new(SlowWhois {
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }),
        );
        let report = prober.probe("example.com").await;
        let now = Utc::now();
        let update = report.to_update(now);

        assert_eq!(update.cert_status, CertStatus::Valid);
        assert_eq!(update.cert_issuer.as_deref(), Some("Test CA"));
        assert_eq!(update.registration_status, RegistrationStatus::Error);
        assert_eq!(update.registration_expiry, None);
        assert_eq!(update.checked_at, now);

        let domain_id = uuid::Uuid::new_v4();
        let history = report.to_history(domain_id, now);
        assert_eq!(history.domain_id, domain_id);
        assert_eq!(history.cert_status, CertStatus::Valid);
        assert_eq!(history.registration_status, RegistrationStatus::Error);
    }
}
