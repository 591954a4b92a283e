// Ledger of sent alerts, used to suppress repeats.

use crate::core::{AlertKey, AlertKind, AlertRecord, DomainId, DomainStore, Insertion};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Remembers which (domain, kind, tier, day) alerts have already been sent.
///
/// At most one notice per key is ever delivered: `record` is backed by the
/// store's atomic insert-if-absent, so two concurrent runs that both pass
/// `was_already_sent` still produce a single ledger row.
#[derive(Clone)]
pub struct DedupLedger {
    store: Arc<dyn DomainStore>,
}

impl DedupLedger {
    pub fn new(store: Arc<dyn DomainStore>) -> Self {
        Self { store }
    }

    /// Checks whether an alert with this key was already recorded.
    pub async fn was_already_sent(
        &self,
        domain_id: DomainId,
        kind: AlertKind,
        threshold_days: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let key = AlertKey {
            domain_id,
            kind,
            threshold_days,
            sent_date: now.date_naive(),
        };
        let exists = self.store.alert_exists(&key).await?;
        if exists {
            metrics::counter!("alerts_deduplicated_total").increment(1);
        }
        Ok(exists)
    }

    /// Records that an alert was sent.
    ///
    /// A key that is already present is not an error; the caller learns about
    /// it through `Insertion::AlreadyExisted`.
    pub async fn record(
        &self,
        domain_id: DomainId,
        kind: AlertKind,
        threshold_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Insertion, StoreError> {
        let record = AlertRecord {
            domain_id,
            kind,
            threshold_days,
            sent_date: now.date_naive(),
            sent_at: now,
        };
        let insertion = self.store.insert_alert_if_absent(record).await?;
        if insertion == Insertion::AlreadyExisted {
            debug!(%domain_id, %kind, threshold_days, "Alert already recorded by a concurrent run");
        }
        Ok(insertion)
    }
}
