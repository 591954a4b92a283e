//! On-demand operations on single domains: pre-check, add, recheck, delete,
//! public sharing and history.
//!
//! None of these evaluate alerts. A recheck persists the fresh status and a
//! history snapshot exactly like a batch run does, but never notifies.

use crate::config::QuotaConfig;
use crate::core::{
    AccountId, CertProbeResult, CertStatus, CheckHistoryRecord, DomainId, DomainProbeReport,
    DomainStore, MonitoredDomain, RegistrationProbeResult, RegistrationStatus,
};
use crate::domain_name::{self, InvalidDomain};
use crate::probe::Prober;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    InvalidDomain(#[from] InvalidDomain),

    #[error("domain limit reached ({current}/{limit} domains), upgrade the plan to add more")]
    QuotaReached { current: usize, limit: usize },

    #[error("domain not found")]
    NotFound,

    #[error("domain belongs to another account")]
    Forbidden,

    #[error("domain '{0}' is already monitored")]
    Duplicate(String),

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for CheckError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(name) => CheckError::Duplicate(name),
            StoreError::QuotaExceeded { current, limit } => {
                CheckError::QuotaReached { current, limit }
            }
            other => CheckError::Store(other),
        }
    }
}

/// Probe results for a name that is not (yet) monitored.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PrecheckReport {
    pub domain: String,
    pub ssl: CertProbeResult,
    pub domain_whois: RegistrationProbeResult,
}

/// The persisted state of a domain right after a probe, with the raw probe
/// results alongside.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DomainState {
    #[serde(flatten)]
    pub domain: MonitoredDomain,
    pub ssl: CertProbeResult,
    pub domain_whois: RegistrationProbeResult,
}

/// What the public status page of a shared domain shows.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublicStatus {
    pub name: String,
    pub cert_status: CertStatus,
    pub cert_expiry: Option<DateTime<Utc>>,
    pub cert_issuer: Option<String>,
    pub registration_status: RegistrationStatus,
    pub registration_expiry: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl From<&MonitoredDomain> for PublicStatus {
    fn from(domain: &MonitoredDomain) -> Self {
        Self {
            name: domain.name.clone(),
            cert_status: domain.cert_status,
            cert_expiry: domain.cert_expiry,
            cert_issuer: domain.cert_issuer.clone(),
            registration_status: domain.registration_status,
            registration_expiry: domain.registration_expiry,
            last_checked: domain.last_checked,
        }
    }
}

#[derive(Clone)]
pub struct Checker {
    store: Arc<dyn DomainStore>,
    prober: Prober,
    quota: QuotaConfig,
}

impl Checker {
    pub fn new(store: Arc<dyn DomainStore>, prober: Prober, quota: QuotaConfig) -> Self {
        Self {
            store,
            prober,
            quota,
        }
    }

    /// Fails with `QuotaReached` when the account is at its plan's limit.
    /// Returns the limit, `None` for unlimited plans.
    async fn ensure_quota(&self, account_id: AccountId) -> Result<Option<usize>, CheckError> {
        let plan = self.store.account_plan(account_id).await?;
        let Some(limit) = self.quota.limit_for(plan) else {
            return Ok(None);
        };
        let current = self.store.count_domains(account_id).await?;
        if current >= limit {
            return Err(CheckError::QuotaReached { current, limit });
        }
        Ok(Some(limit))
    }

    /// Loads a domain and checks that `account_id` owns it.
    async fn owned_domain(
        &self,
        account_id: AccountId,
        domain_id: DomainId,
    ) -> Result<MonitoredDomain, CheckError> {
        let domain = self
            .store
            .get_domain(domain_id)
            .await?
            .ok_or(CheckError::NotFound)?;
        if domain.account_id != account_id {
            return Err(CheckError::Forbidden);
        }
        Ok(domain)
    }

    /// Persists a probe report for a known domain and returns its fresh state.
    async fn persist(
        &self,
        mut domain: MonitoredDomain,
        report: DomainProbeReport,
    ) -> Result<DomainState, CheckError> {
        let checked_at = Utc::now();
        let update = report.to_update(checked_at);
        self.store.update_domain(domain.id, &update).await?;
        if let Err(e) = self
            .store
            .insert_history(report.to_history(domain.id, checked_at))
            .await
        {
            warn!(domain = %domain.name, error = %e, "Failed to store history snapshot");
        }
        domain.apply(&update);
        Ok(DomainState {
            domain,
            ssl: report.cert,
            domain_whois: report.registration,
        })
    }

    /// Probes a name before it is added. The quota is checked first so an
    /// account at its limit never triggers network work.
    #[instrument(skip(self))]
    pub async fn precheck(
        &self,
        account_id: AccountId,
        raw: &str,
    ) -> Result<PrecheckReport, CheckError> {
        self.ensure_quota(account_id).await?;
        let name = domain_name::parse(raw)?;
        let report = self.prober.probe(&name).await;
        Ok(PrecheckReport {
            domain: name,
            ssl: report.cert,
            domain_whois: report.registration,
        })
    }

    /// Starts monitoring a domain and runs its first check.
    #[instrument(skip(self))]
    pub async fn add_domain(
        &self,
        account_id: AccountId,
        raw: &str,
    ) -> Result<DomainState, CheckError> {
        let limit = self.ensure_quota(account_id).await?;
        let name = domain_name::parse(raw)?;
        let domain = MonitoredDomain::new(account_id, &name);
        // The store re-checks the limit so concurrent adds cannot overshoot it.
        let domain = match limit {
            Some(limit) => self.store.insert_domain_within(domain, limit).await?,
            None => self.store.insert_domain(domain).await?,
        };
        info!(domain = %domain.name, id = %domain.id, "Domain added");

        let report = self.prober.probe(&domain.name).await;
        self.persist(domain, report).await
    }

    /// Re-probes a domain now and persists the result.
    #[instrument(skip(self))]
    pub async fn recheck(
        &self,
        account_id: AccountId,
        domain_id: DomainId,
    ) -> Result<DomainState, CheckError> {
        let domain = self.owned_domain(account_id, domain_id).await?;
        let report = self.prober.probe(&domain.name).await;
        self.persist(domain, report).await
    }

    #[instrument(skip(self))]
    pub async fn delete_domain(
        &self,
        account_id: AccountId,
        domain_id: DomainId,
    ) -> Result<(), CheckError> {
        let domain = self.owned_domain(account_id, domain_id).await?;
        if !self.store.delete_domain(domain.id).await? {
            return Err(CheckError::NotFound);
        }
        info!(domain = %domain.name, "Domain deleted");
        Ok(())
    }

    /// Returns the domain's share token, creating one if needed.
    pub async fn issue_public_token(
        &self,
        account_id: AccountId,
        domain_id: DomainId,
    ) -> Result<String, CheckError> {
        let domain = self.owned_domain(account_id, domain_id).await?;
        if let Some(token) = domain.public_token {
            return Ok(token);
        }
        let token = Uuid::new_v4().to_string();
        self.store
            .set_public_token(domain.id, Some(token.clone()))
            .await?;
        Ok(token)
    }

    pub async fn revoke_public_token(
        &self,
        account_id: AccountId,
        domain_id: DomainId,
    ) -> Result<(), CheckError> {
        let domain = self.owned_domain(account_id, domain_id).await?;
        self.store.set_public_token(domain.id, None).await?;
        Ok(())
    }

    /// The status of a shared domain, looked up by its token.
    pub async fn public_status(&self, token: &str) -> Result<PublicStatus, CheckError> {
        let domain = self
            .store
            .find_by_public_token(token)
            .await?
            .ok_or(CheckError::NotFound)?;
        Ok(PublicStatus::from(&domain))
    }

    /// Most recent snapshots first.
    pub async fn history(
        &self,
        account_id: AccountId,
        domain_id: DomainId,
        limit: usize,
    ) -> Result<Vec<CheckHistoryRecord>, CheckError> {
        let domain = self.owned_domain(account_id, domain_id).await?;
        Ok(self.store.history(domain.id, limit).await?)
    }
}
