//! WHOIS registration probe.
//!
//! Speaks the plain WHOIS protocol (RFC 3912) over TCP: the root server is
//! asked which registry serves the TLD, the registry is asked about the
//! domain, and one registrar referral is followed when the registry answer
//! carries no expiry date.

use super::ProbeError;
use crate::config::ProbeConfig;
use crate::core::{RegistrationProbe, RegistrationProbeResult};
use crate::status::{classify, days_until};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Field names carrying the expiry date, in order of preference.
pub const EXPIRY_FIELDS: [&str; 6] = [
    "Expiry Date",
    "Registry Expiry Date",
    "Registrar Registration Expiration Date",
    "paid-till",
    "Expiration Date",
    "expire",
];

const REGISTRAR_FIELD: &str = "Registrar";
const REFERRAL_FIELDS: [&str; 2] = ["refer", "whois"];
const REGISTRAR_REFERRAL_FIELD: &str = "Registrar WHOIS Server";

/// Responses larger than this are truncated.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

/// A parsed WHOIS response: `Key: value` pairs in response order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhoisRecord {
    fields: Vec<(String, String)>,
}

impl WhoisRecord {
    pub fn parse(response: &str) -> Self {
        let fields = response
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('%') && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .collect();
        Self { fields }
    }

    /// First non-empty value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The raw expiry value of the most preferred field present.
    pub fn expiry_raw(&self) -> Option<&str> {
        EXPIRY_FIELDS.iter().find_map(|field| self.get(field))
    }

    pub fn registrar(&self) -> Option<String> {
        self.get(REGISTRAR_FIELD).map(str::to_string)
    }

    fn referral(&self) -> Option<&str> {
        REFERRAL_FIELDS.iter().find_map(|field| self.get(field))
    }
}

/// Parses the date formats registries commonly use. Dates without a time of
/// day are taken as midnight UTC.
pub fn parse_whois_date(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%d-%b-%Y %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d-%b-%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    // Some registries append a zone name, e.g. "2026-03-01 00:00:00 (UTC+8)".
    let (head, _) = value.split_once(" (")?;
    parse_whois_date(head)
}

/// Looks up registration expiry over WHOIS.
pub struct WhoisRegistrationProbe {
    root_server: String,
    port: u16,
    server_override: Option<String>,
    timeout: Duration,
}

impl WhoisRegistrationProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            root_server: config.whois_root_server.clone(),
            port: config.whois_port,
            server_override: config.whois_server_override.clone(),
            timeout: config.whois_timeout(),
        }
    }

    /// Sends one query and reads the response until the server closes.
    async fn query(&self, server: &str, query: &str) -> Result<String, ProbeError> {
        let server = server
            .trim_start_matches("whois://")
            .trim_start_matches("rwhois://")
            .trim_end_matches('/');
        let address = if server.contains(':') {
            server.to_string()
        } else {
            format!("{}:{}", server, self.port)
        };
        debug!(server = %address, query, "Sending WHOIS query");

        let mut stream = TcpStream::connect(&address)
            .await
            .map_err(ProbeError::Connect)?;
        stream
            .write_all(format!("{query}\r\n").as_bytes())
            .await
            .map_err(|e| ProbeError::Whois(e.to_string()))?;

        let mut buf = Vec::new();
        stream
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ProbeError::Whois(e.to_string()))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Asks the root server which registry server handles the domain's TLD.
    async fn registry_server(&self, domain: &str) -> Result<String, ProbeError> {
        let tld = domain.rsplit('.').next().unwrap_or(domain);
        let response = self.query(&self.root_server, tld).await?;
        WhoisRecord::parse(&response)
            .referral()
            .map(str::to_string)
            .ok_or_else(|| ProbeError::Whois(format!("no WHOIS server known for .{tld}")))
    }

    async fn lookup(&self, domain: &str) -> Result<WhoisRecord, ProbeError> {
        let server = match &self.server_override {
            Some(server) => server.clone(),
            None => self.registry_server(domain).await?,
        };
        let record = WhoisRecord::parse(&self.query(&server, domain).await?);
        if record.expiry_raw().is_some() {
            return Ok(record);
        }

        // Thin registries leave the details to the registrar.
        match record.get(REGISTRAR_REFERRAL_FIELD) {
            Some(referral) if !referral.eq_ignore_ascii_case(&server) => {
                match self.query(referral, domain).await {
                    Ok(response) => {
                        let mut registrar_record = WhoisRecord::parse(&response);
                        if registrar_record.expiry_raw().is_none() {
                            return Ok(record);
                        }
                        if registrar_record.registrar().is_none() {
                            if let Some(name) = record.registrar() {
                                registrar_record
                                    .fields
                                    .push((REGISTRAR_FIELD.to_string(), name));
                            }
                        }
                        Ok(registrar_record)
                    }
                    Err(e) => {
                        debug!(referral, error = %e, "Registrar WHOIS referral failed");
                        Ok(record)
                    }
                }
            }
            _ => Ok(record),
        }
    }
}

#[async_trait]
impl RegistrationProbe for WhoisRegistrationProbe {
    #[instrument(skip(self))]
    async fn probe(&self, domain: &str) -> RegistrationProbeResult {
        let record = match timeout(self.timeout, self.lookup(domain)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                debug!(error = %e, "WHOIS lookup failed");
                return RegistrationProbeResult::failed(e.to_string(), None);
            }
            Err(_) => {
                let e = ProbeError::Timeout {
                    stage: "WHOIS lookup",
                    after: self.timeout,
                };
                debug!(error = %e, "WHOIS lookup failed");
                return RegistrationProbeResult::failed(e.to_string(), None);
            }
        };

        let registrar = record.registrar();
        let Some(raw) = record.expiry_raw() else {
            return RegistrationProbeResult::failed("no expiry date found in WHOIS data", registrar);
        };
        let Some(expiry) = parse_whois_date(raw) else {
            return RegistrationProbeResult::failed(
                format!("could not parse WHOIS expiry date: {raw}"),
                registrar,
            );
        };

        let days = days_until(expiry, Utc::now());
        RegistrationProbeResult {
            expiry: Some(expiry),
            days_remaining: Some(days),
            status: classify(days),
            registrar,
            error: None,
        }
    }
}
