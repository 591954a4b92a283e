//! In-memory `DomainStore`.

use super::{SeedData, StoreError};
use crate::core::{
    AccountId, AlertKey, AlertRecord, CheckHistoryRecord, DomainId, DomainStore, DomainUpdate,
    Insertion, MonitoredDomain, NotificationPreference, Plan,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone)]
struct Account {
    email: Option<String>,
    plan: Plan,
}

#[derive(Default)]
struct Inner {
    domains: HashMap<DomainId, MonitoredDomain>,
    history: Vec<CheckHistoryRecord>,
    alerts: HashMap<AlertKey, AlertRecord>,
    accounts: HashMap<AccountId, Account>,
    preferences: HashMap<AccountId, NotificationPreference>,
}

impl Inner {
    fn insert_domain(&mut self, domain: MonitoredDomain) -> Result<MonitoredDomain, StoreError> {
        let exists = self
            .domains
            .values()
            .any(|d| d.account_id == domain.account_id && d.name == domain.name);
        if exists {
            return Err(StoreError::Duplicate(domain.name));
        }
        self.domains.insert(domain.id, domain.clone());
        Ok(domain)
    }
}

/// A `DomainStore` held entirely in process memory. Nothing survives a
/// restart, including the alert ledger.
///
/// All writes take a single write lock, which makes `insert_alert_if_absent`
/// an atomic check-and-insert.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from parsed seed data. Domain names are normalized and
    /// validated the same way as domains added at runtime.
    pub fn from_seed(seed: SeedData) -> Result<Self, StoreError> {
        let mut inner = Inner::default();
        for account in seed.normalized()?.accounts {
            inner.accounts.insert(
                account.id,
                Account {
                    email: account.email,
                    plan: account.plan,
                },
            );
            if let Some(webhook) = account.webhook {
                inner.preferences.insert(
                    account.id,
                    NotificationPreference {
                        account_id: account.id,
                        webhook_url: Some(webhook.url),
                        enabled: webhook.enabled,
                    },
                );
            }
            for seed_domain in account.domains {
                let domain = MonitoredDomain::new(account.id, &seed_domain.name);
                inner.domains.insert(domain.id, domain);
            }
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Reads and parses a YAML seed file.
    pub fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let store = Self::from_seed(SeedData::from_file(path)?)?;
        info!(path = %path.display(), "Loaded seed data");
        Ok(store)
    }

    /// Registers or replaces an account.
    pub async fn add_account(&self, id: AccountId, email: Option<&str>, plan: Plan) {
        self.inner.write().await.accounts.insert(
            id,
            Account {
                email: email.map(str::to_string),
                plan,
            },
        );
    }

    pub async fn set_notification_preference(&self, preference: NotificationPreference) {
        self.inner
            .write()
            .await
            .preferences
            .insert(preference.account_id, preference);
    }

    /// Every ledger entry, in no particular order.
    pub async fn alerts(&self) -> Vec<AlertRecord> {
        self.inner.read().await.alerts.values().cloned().collect()
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn list_domains(&self) -> Result<Vec<MonitoredDomain>, StoreError> {
        let inner = self.inner.read().await;
        let mut domains: Vec<_> = inner.domains.values().cloned().collect();
        domains.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(domains)
    }

    async fn get_domain(&self, id: DomainId) -> Result<Option<MonitoredDomain>, StoreError> {
        Ok(self.inner.read().await.domains.get(&id).cloned())
    }

    async fn insert_domain(&self, domain: MonitoredDomain) -> Result<MonitoredDomain, StoreError> {
        let mut inner = self.inner.write().await;
        inner.insert_domain(domain)
    }

    async fn insert_domain_within(
        &self,
        domain: MonitoredDomain,
        limit: usize,
    ) -> Result<MonitoredDomain, StoreError> {
        let mut inner = self.inner.write().await;
        let current = inner
            .domains
            .values()
            .filter(|d| d.account_id == domain.account_id)
            .count();
        if current >= limit {
            return Err(StoreError::QuotaExceeded { current, limit });
        }
        inner.insert_domain(domain)
    }

    async fn update_domain(&self, id: DomainId, update: &DomainUpdate) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let domain = inner
            .domains
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("domain {id}")))?;
        domain.apply(update);
        Ok(())
    }

    async fn delete_domain(&self, id: DomainId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.domains.remove(&id).is_some();
        if removed {
            inner.history.retain(|h| h.domain_id != id);
            inner.alerts.retain(|key, _| key.domain_id != id);
        }
        Ok(removed)
    }

    async fn set_public_token(&self, id: DomainId, token: Option<String>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let domain = inner
            .domains
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("domain {id}")))?;
        domain.public_token = token;
        Ok(())
    }

    async fn find_by_public_token(&self, token: &str) -> Result<Option<MonitoredDomain>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .domains
            .values()
            .find(|d| d.public_token.as_deref() == Some(token))
            .cloned())
    }

    async fn count_domains(&self, account_id: AccountId) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .domains
            .values()
            .filter(|d| d.account_id == account_id)
            .count())
    }

    async fn insert_history(&self, record: CheckHistoryRecord) -> Result<(), StoreError> {
        self.inner.write().await.history.push(record);
        Ok(())
    }

    async fn history(
        &self,
        domain_id: DomainId,
        limit: usize,
    ) -> Result<Vec<CheckHistoryRecord>, StoreError> {
        let inner = self.inner.read().await;
        // Insertion order is chronological, so walking backwards is newest first.
        Ok(inner
            .history
            .iter()
            .rev()
            .filter(|h| h.domain_id == domain_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn alert_exists(&self, key: &AlertKey) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.alerts.contains_key(key))
    }

    async fn insert_alert_if_absent(&self, record: AlertRecord) -> Result<Insertion, StoreError> {
        let mut inner = self.inner.write().await;
        let key = record.key();
        if inner.alerts.contains_key(&key) {
            return Ok(Insertion::AlreadyExisted);
        }
        inner.alerts.insert(key, record);
        Ok(Insertion::Inserted)
    }

    async fn account_email(&self, account_id: AccountId) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .get(&account_id)
            .and_then(|a| a.email.clone()))
    }

    async fn notification_preference(
        &self,
        account_id: AccountId,
    ) -> Result<Option<NotificationPreference>, StoreError> {
        Ok(self.inner.read().await.preferences.get(&account_id).cloned())
    }

    async fn account_plan(&self, account_id: AccountId) -> Result<Plan, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .get(&account_id)
            .map(|a| a.plan)
            .unwrap_or_default())
    }
}
