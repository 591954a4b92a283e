//! A `DomainStore` wrapper that injects failures into selected operations.

use async_trait::async_trait;
use domainwatch::core::{
    AccountId, AlertKey, AlertRecord, CheckHistoryRecord, DomainId, DomainStore, DomainUpdate,
    Insertion, MonitoredDomain, NotificationPreference, Plan,
};
use domainwatch::store::{MemoryStore, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct FailingStore {
    inner: Arc<MemoryStore>,
    fail_update_for: Option<String>,
    fail_list: bool,
    fail_history: bool,
    fail_alert_insert: bool,
    email_lookups: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_update_for: None,
            fail_list: false,
            fail_history: false,
            fail_alert_insert: false,
            email_lookups: AtomicUsize::new(0),
        }
    }

    /// Fails `update_domain` for the domain with this name.
    pub fn fail_update_for(mut self, name: &str) -> Self {
        self.fail_update_for = Some(name.to_string());
        self
    }

    pub fn fail_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn fail_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    pub fn fail_alert_insert(mut self) -> Self {
        self.fail_alert_insert = true;
        self
    }

    /// How often an account email was read.
    pub fn email_lookups(&self) -> usize {
        self.email_lookups.load(Ordering::SeqCst)
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection reset".to_string())
}

#[async_trait]
impl DomainStore for FailingStore {
    async fn list_domains(&self) -> Result<Vec<MonitoredDomain>, StoreError> {
        if self.fail_list {
            return Err(unavailable());
        }
        self.inner.list_domains().await
    }

    async fn get_domain(&self, id: DomainId) -> Result<Option<MonitoredDomain>, StoreError> {
        self.inner.get_domain(id).await
    }

    async fn insert_domain(&self, domain: MonitoredDomain) -> Result<MonitoredDomain, StoreError> {
        self.inner.insert_domain(domain).await
    }

    async fn insert_domain_within(
        &self,
        domain: MonitoredDomain,
        limit: usize,
    ) -> Result<MonitoredDomain, StoreError> {
        self.inner.insert_domain_within(domain, limit).await
    }

    async fn update_domain(&self, id: DomainId, update: &DomainUpdate) -> Result<(), StoreError> {
        if let Some(name) = &self.fail_update_for {
            let domain = self.inner.get_domain(id).await?;
            if domain.is_some_and(|d| &d.name == name) {
                return Err(unavailable());
            }
        }
        self.inner.update_domain(id, update).await
    }

    async fn delete_domain(&self, id: DomainId) -> Result<bool, StoreError> {
        self.inner.delete_domain(id).await
    }

    async fn set_public_token(&self, id: DomainId, token: Option<String>) -> Result<(), StoreError> {
        self.inner.set_public_token(id, token).await
    }

    async fn find_by_public_token(&self, token: &str) -> Result<Option<MonitoredDomain>, StoreError> {
        self.inner.find_by_public_token(token).await
    }

    async fn count_domains(&self, account_id: AccountId) -> Result<usize, StoreError> {
        self.inner.count_domains(account_id).await
    }

    async fn insert_history(&self, record: CheckHistoryRecord) -> Result<(), StoreError> {
        if self.fail_history {
            return Err(unavailable());
        }
        self.inner.insert_history(record).await
    }

    async fn history(&self, domain_id: DomainId, limit: usize) -> Result<Vec<CheckHistoryRecord>, StoreError> {
        self.inner.history(domain_id, limit).await
    }

    async fn alert_exists(&self, key: &AlertKey) -> Result<bool, StoreError> {
        self.inner.alert_exists(key).await
    }

    async fn insert_alert_if_absent(&self, record: AlertRecord) -> Result<Insertion, StoreError> {
        if self.fail_alert_insert {
            return Err(unavailable());
        }
        self.inner.insert_alert_if_absent(record).await
    }

    async fn account_email(&self, account_id: AccountId) -> Result<Option<String>, StoreError> {
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.account_email(account_id).await
    }

    async fn notification_preference(
        &self,
        account_id: AccountId,
    ) -> Result<Option<NotificationPreference>, StoreError> {
        self.inner.notification_preference(account_id).await
    }

    async fn account_plan(&self, account_id: AccountId) -> Result<Plan, StoreError> {
        self.inner.account_plan(account_id).await
    }
}
