//! TLS certificate probe.

use super::ProbeError;
use crate::core::{CertProbeResult, CertificateProbe, ProbeStatus};
use crate::status::{classify, days_until};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector;
use tracing::{debug, instrument};
use x509_parser::prelude::*;

/// The parts of a leaf certificate the probe reports.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateInfo {
    pub not_after: DateTime<Utc>,
    pub issuer: Option<String>,
}

/// Inspects the certificate a domain serves on its TLS port.
pub struct TlsCertificateProbe {
    port: u16,
    timeout: Duration,
    verifying: TlsConnector,
    // Only used to read the certificate after verification has failed.
    inspecting: TlsConnector,
}

impl TlsCertificateProbe {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, native_tls::Error> {
        let verifying = native_tls::TlsConnector::builder().build()?;
        let inspecting = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        Ok(Self {
            port,
            timeout,
            verifying: verifying.into(),
            inspecting: inspecting.into(),
        })
    }

    /// Connects and returns the DER bytes of the peer's leaf certificate.
    async fn fetch_certificate(
        &self,
        connector: &TlsConnector,
        domain: &str,
    ) -> Result<Vec<u8>, ProbeError> {
        let tcp = TcpStream::connect((domain, self.port))
            .await
            .map_err(ProbeError::Connect)?;
        let stream = connector
            .connect(domain, tcp)
            .await
            .map_err(ProbeError::Handshake)?;

        let certificate = stream
            .get_ref()
            .peer_certificate()
            .map_err(|e| ProbeError::Certificate(e.to_string()))?
            .ok_or_else(|| ProbeError::Certificate("no peer certificate".to_string()))?;
        certificate
            .to_der()
            .map_err(|e| ProbeError::Certificate(e.to_string()))
    }

    /// Fetches and classifies the certificate. Unbounded in time; `probe`
    /// puts one deadline around the whole sequence.
    async fn inspect(&self, domain: &str, now: DateTime<Utc>) -> CertProbeResult {
        let der = match self.fetch_certificate(&self.verifying, domain).await {
            Ok(der) => der,
            Err(ProbeError::Handshake(e)) => {
                // The server answered but its certificate did not verify. Read it
                // anyway so the expiry can still be reported.
                debug!(error = %e, "Certificate verification failed, inspecting certificate");
                return match self
                    .fetch_certificate(&self.inspecting, domain)
                    .await
                    .and_then(|der| parse_certificate(&der))
                {
                    Ok(info) => CertProbeResult {
                        expiry: Some(info.not_after),
                        days_remaining: Some(days_until(info.not_after, now)),
                        status: ProbeStatus::Error,
                        issuer: info.issuer,
                        error: Some(format!("certificate is invalid: {e}")),
                    },
                    Err(_) => CertProbeResult::failed(ProbeError::Handshake(e).to_string()),
                };
            }
            Err(e) => {
                debug!(error = %e, "Certificate probe failed");
                return CertProbeResult::failed(e.to_string());
            }
        };

        match parse_certificate(&der) {
            Ok(info) => {
                let days = days_until(info.not_after, now);
                CertProbeResult {
                    expiry: Some(info.not_after),
                    days_remaining: Some(days),
                    status: classify(days),
                    issuer: info.issuer,
                    error: None,
                }
            }
            Err(e) => CertProbeResult::failed(e.to_string()),
        }
    }
}

/// Extracts the not-after date and the issuer (organization, falling back to
/// common name) from a DER-encoded certificate.
pub fn parse_certificate(der: &[u8]) -> Result<CertificateInfo, ProbeError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| ProbeError::Certificate(format!("failed to parse X.509 certificate: {e}")))?;

    let timestamp = cert.validity().not_after.timestamp();
    let not_after = DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        ProbeError::Certificate(format!("not-after timestamp out of range: {timestamp}"))
    })?;

    let issuer = cert
        .issuer()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .or_else(|| {
            cert.issuer()
                .iter_common_name()
                .next()
                .and_then(|attr| attr.as_str().ok())
        })
        .map(str::to_string);

    Ok(CertificateInfo { not_after, issuer })
}

#[async_trait]
impl CertificateProbe for TlsCertificateProbe {
    #[instrument(skip(self))]
    async fn probe(&self, domain: &str) -> CertProbeResult {
        let now = Utc::now();
        match timeout(self.timeout, self.inspect(domain, now)).await {
            Ok(result) => result,
            Err(_) => {
                let e = ProbeError::Timeout {
                    stage: "certificate probe",
                    after: self.timeout,
                };
                debug!(error = %e, "Certificate probe failed");
                CertProbeResult::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_handshake_timeout_is_an_error_result() {
        // Accepts connections but never speaks TLS.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let probe = TlsCertificateProbe::new(port, Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let result = probe.probe("127.0.0.1").await;

        // One deadline covers connect, handshake and any retry.
        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(result.status, ProbeStatus::Error);
        assert_eq!(result.expiry, None);
        assert_eq!(result.days_remaining, None);
        assert_eq!(result.issuer, None);
        assert_eq!(
            result.error.as_deref(),
            Some("certificate probe timed out after 200ms")
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error_result() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TlsCertificateProbe::new(port, Duration::from_millis(500)).unwrap();
        let result = probe.probe("127.0.0.1").await;

        assert_eq!(result.status, ProbeStatus::Error);
        assert_eq!(result.expiry, None);
        assert_eq!(result.issuer, None);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_parse_certificate_rejects_garbage() {
        let err = parse_certificate(b"not a certificate").unwrap_err();
        assert!(err.to_string().contains("X.509"));
    }
}
