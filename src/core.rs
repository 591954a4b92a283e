//! Core domain types and service traits for domainwatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use crate::notification::NotifyError;
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type DomainId = Uuid;
pub type AccountId = Uuid;

/// Public certificate status, as stored on a monitored domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertStatus {
    Valid,
    ExpiringSoon,
    Expired,
    Error,
    #[default]
    Unknown,
}

/// Public registration status, as stored on a monitored domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Active,
    ExpiringSoon,
    Expired,
    Error,
    #[default]
    Unknown,
}

/// Internal classification of a single probe outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Warning,
    Critical,
    Error,
}

/// The kind of notification recorded in the alert ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CertExpiry,
    RegistrationExpiry,
    /// Reserved; probe failures are not notified on their own.
    CertError,
    /// Reserved; probe failures are not notified on their own.
    RegistrationError,
}

impl AlertKind {
    /// Human-readable label used in subjects, payloads and the run log.
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::CertExpiry | AlertKind::CertError => "SSL certificate",
            AlertKind::RegistrationExpiry | AlertKind::RegistrationError => "Domain registration",
        }
    }

    /// Short facet tag used in run log lines.
    pub fn facet(&self) -> &'static str {
        match self {
            AlertKind::CertExpiry | AlertKind::CertError => "SSL",
            AlertKind::RegistrationExpiry | AlertKind::RegistrationError => "Domain",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::CertExpiry => "cert_expiry",
            AlertKind::RegistrationExpiry => "registration_expiry",
            AlertKind::CertError => "cert_error",
            AlertKind::RegistrationError => "registration_error",
        };
        f.write_str(s)
    }
}

/// Subscription plan of an account; determines the domain quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Agency,
}

/// One domain under watch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoredDomain {
    pub id: DomainId,
    pub account_id: AccountId,
    /// Normalized domain name (lowercase, no scheme, path or port).
    pub name: String,
    pub cert_expiry: Option<DateTime<Utc>>,
    pub cert_status: CertStatus,
    pub cert_issuer: Option<String>,
    pub registration_expiry: Option<DateTime<Utc>>,
    pub registration_status: RegistrationStatus,
    pub registrar: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub public_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MonitoredDomain {
    /// Creates a never-checked domain record.
    pub fn new(account_id: AccountId, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            name: name.to_string(),
            cert_expiry: None,
            cert_status: CertStatus::Unknown,
            cert_issuer: None,
            registration_expiry: None,
            registration_status: RegistrationStatus::Unknown,
            registrar: None,
            last_checked: None,
            public_token: None,
            created_at: Utc::now(),
        }
    }

    /// Applies a persisted status update to this record.
    pub fn apply(&mut self, update: &DomainUpdate) {
        self.cert_expiry = update.cert_expiry;
        self.cert_status = update.cert_status;
        self.cert_issuer = update.cert_issuer.clone();
        self.registration_expiry = update.registration_expiry;
        self.registration_status = update.registration_status;
        self.registrar = update.registrar.clone();
        self.last_checked = Some(update.checked_at);
    }
}

/// The status fields written to a domain after a probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainUpdate {
    pub cert_expiry: Option<DateTime<Utc>>,
    pub cert_status: CertStatus,
    pub cert_issuer: Option<String>,
    pub registration_expiry: Option<DateTime<Utc>>,
    pub registration_status: RegistrationStatus,
    pub registrar: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Immutable snapshot of one probe outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckHistoryRecord {
    pub domain_id: DomainId,
    pub cert_status: CertStatus,
    pub registration_status: RegistrationStatus,
    pub cert_expiry: Option<DateTime<Utc>>,
    pub registration_expiry: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

impl CheckHistoryRecord {
    pub fn from_update(domain_id: DomainId, update: &DomainUpdate) -> Self {
        Self {
            domain_id,
            cert_status: update.cert_status,
            registration_status: update.registration_status,
            cert_expiry: update.cert_expiry,
            registration_expiry: update.registration_expiry,
            checked_at: update.checked_at,
        }
    }
}

/// The uniqueness key of the alert ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub domain_id: DomainId,
    pub kind: AlertKind,
    pub threshold_days: u32,
    pub sent_date: NaiveDate,
}

/// Proof that a notification was sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    pub domain_id: DomainId,
    pub kind: AlertKind,
    pub threshold_days: u32,
    pub sent_date: NaiveDate,
    pub sent_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            domain_id: self.domain_id,
            kind: self.kind,
            threshold_days: self.threshold_days,
            sent_date: self.sent_date,
        }
    }
}

/// Outcome of an insert-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    AlreadyExisted,
}

/// Per-account webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotificationPreference {
    pub account_id: AccountId,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl NotificationPreference {
    /// Returns the webhook URL only if the channel is enabled and configured.
    pub fn active_webhook(&self) -> Option<&str> {
        match &self.webhook_url {
            Some(url) if self.enabled && !url.trim().is_empty() => Some(url.as_str()),
            _ => None,
        }
    }
}

/// Everything the dispatcher needs to reach an account.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountContact {
    pub email: Option<String>,
    pub preference: Option<NotificationPreference>,
}

impl AccountContact {
    pub fn webhook_url(&self) -> Option<&str> {
        self.preference.as_ref().and_then(|p| p.active_webhook())
    }
}

// =============================================================================
// Probe results
// =============================================================================

/// Outcome of a TLS certificate probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertProbeResult {
    pub expiry: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub status: ProbeStatus,
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CertProbeResult {
    /// A failed probe with no certificate data.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            expiry: None,
            days_remaining: None,
            status: ProbeStatus::Error,
            issuer: None,
            error: Some(message.into()),
        }
    }
}

/// Outcome of a WHOIS registration probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrationProbeResult {
    pub expiry: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub status: ProbeStatus,
    pub registrar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistrationProbeResult {
    /// A failed probe, optionally keeping a registrar that was found.
    pub fn failed(message: impl Into<String>, registrar: Option<String>) -> Self {
        Self {
            expiry: None,
            days_remaining: None,
            status: ProbeStatus::Error,
            registrar,
            error: Some(message.into()),
        }
    }
}

/// Both probe outcomes for one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainProbeReport {
    pub domain: String,
    pub cert: CertProbeResult,
    pub registration: RegistrationProbeResult,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Inspects the TLS certificate served by a domain.
#[async_trait]
pub trait CertificateProbe: Send + Sync {
    /// Never fails: every failure is reported as a `ProbeStatus::Error` result.
    async fn probe(&self, domain: &str) -> CertProbeResult;
}

/// Looks up the registration expiry of a domain.
#[async_trait]
pub trait RegistrationProbe: Send + Sync {
    /// Never fails: every failure is reported as a `ProbeStatus::Error` result.
    async fn probe(&self, domain: &str) -> RegistrationProbeResult;
}

/// The persistence collaborator.
///
/// Implementations must make `insert_alert_if_absent` atomic with respect to
/// the `AlertKey` uniqueness constraint.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn list_domains(&self) -> Result<Vec<MonitoredDomain>, StoreError>;
    async fn get_domain(&self, id: DomainId) -> Result<Option<MonitoredDomain>, StoreError>;
    /// Fails with `StoreError::Duplicate` if the account already watches this name.
    async fn insert_domain(&self, domain: MonitoredDomain) -> Result<MonitoredDomain, StoreError>;
    /// Like `insert_domain`, but fails with `StoreError::QuotaExceeded` when the
    /// account already has `limit` domains. The count and the insert are atomic.
    async fn insert_domain_within(
        &self,
        domain: MonitoredDomain,
        limit: usize,
    ) -> Result<MonitoredDomain, StoreError>;
    async fn update_domain(&self, id: DomainId, update: &DomainUpdate) -> Result<(), StoreError>;
    async fn delete_domain(&self, id: DomainId) -> Result<bool, StoreError>;
    async fn set_public_token(&self, id: DomainId, token: Option<String>) -> Result<(), StoreError>;
    async fn find_by_public_token(&self, token: &str) -> Result<Option<MonitoredDomain>, StoreError>;
    async fn count_domains(&self, account_id: AccountId) -> Result<usize, StoreError>;

    async fn insert_history(&self, record: CheckHistoryRecord) -> Result<(), StoreError>;
    /// Most recent snapshots first.
    async fn history(&self, domain_id: DomainId, limit: usize) -> Result<Vec<CheckHistoryRecord>, StoreError>;

    async fn alert_exists(&self, key: &AlertKey) -> Result<bool, StoreError>;
    async fn insert_alert_if_absent(&self, record: AlertRecord) -> Result<Insertion, StoreError>;

    async fn account_email(&self, account_id: AccountId) -> Result<Option<String>, StoreError>;
    async fn notification_preference(
        &self,
        account_id: AccountId,
    ) -> Result<Option<NotificationPreference>, StoreError>;
    async fn account_plan(&self, account_id: AccountId) -> Result<Plan, StoreError>;
}

/// An optional file attached to an email.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachment: Option<Attachment>,
}

/// Delivers rendered emails.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// A unique, descriptive name for the sender, used for logging.
    fn name(&self) -> &str;

    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// The semantic content of one alert, independent of the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertNotice {
    pub domain_name: String,
    pub kind: AlertKind,
    pub days_remaining: i64,
    pub expiry: DateTime<Utc>,
    pub dashboard_url: String,
}

/// Posts alerts to a webhook URL.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, url: &str, notice: &AlertNotice) -> Result<(), NotifyError>;
}
