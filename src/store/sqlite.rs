//! SQLite-backed `DomainStore`.
//!
//! Domain ids, check history and the alert ledger live in one database file,
//! so a domain keeps its id across restarts and a second run on the same day
//! finds the ledger rows written by the first. The ledger's uniqueness key is
//! a `UNIQUE` constraint; `insert_alert_if_absent` is a single
//! `INSERT OR IGNORE` whose change count tells whether the row is new.

use super::{SeedData, StoreError};
use crate::core::{
    AccountId, AlertKey, AlertRecord, CheckHistoryRecord, DomainId, DomainStore, DomainUpdate,
    Insertion, MonitoredDomain, NotificationPreference, Plan,
};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

const ACCOUNTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id BLOB PRIMARY KEY,
    email TEXT,
    plan TEXT NOT NULL DEFAULT 'free'
);
CREATE TABLE IF NOT EXISTS notification_preferences (
    account_id BLOB PRIMARY KEY,
    webhook_url TEXT,
    enabled INTEGER NOT NULL DEFAULT 0
);
";

const DOMAINS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS domains (
    id BLOB PRIMARY KEY,
    account_id BLOB NOT NULL,
    name TEXT NOT NULL,
    cert_expiry TEXT,
    cert_status TEXT NOT NULL,
    cert_issuer TEXT,
    registration_expiry TEXT,
    registration_status TEXT NOT NULL,
    registrar TEXT,
    last_checked TEXT,
    public_token TEXT UNIQUE,
    created_at TEXT NOT NULL,
    UNIQUE(account_id, name)
);
CREATE INDEX IF NOT EXISTS idx_domains_account_id ON domains(account_id);
";

const CHECK_HISTORY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS check_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_id BLOB NOT NULL,
    cert_status TEXT NOT NULL,
    registration_status TEXT NOT NULL,
    cert_expiry TEXT,
    registration_expiry TEXT,
    checked_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_check_history_domain_id ON check_history(domain_id);
";

const ALERT_LOG_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alert_log (
    domain_id BLOB NOT NULL,
    kind TEXT NOT NULL,
    threshold_days INTEGER NOT NULL,
    sent_date TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    UNIQUE(domain_id, kind, threshold_days, sent_date)
);
";

const DOMAIN_COLUMNS: &str = "id, account_id, name, cert_expiry, cert_status, cert_issuer, \
     registration_expiry, registration_status, registrar, last_checked, public_token, created_at";

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "Initialized domain store");
        Ok(store)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(ACCOUNTS_SCHEMA)?;
        conn.execute_batch(DOMAINS_SCHEMA)?;
        conn.execute_batch(CHECK_HISTORY_SCHEMA)?;
        conn.execute_batch(ALERT_LOG_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Merges seed data into the database and returns how many domains were
    /// new. Accounts and webhooks are overwritten; domains already present
    /// for an account keep their id, status and history.
    pub fn apply_seed(&self, seed: SeedData) -> Result<usize, StoreError> {
        let seed = seed.normalized()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut added = 0;
        for account in seed.accounts {
            upsert_account(&tx, account.id, account.email.as_deref(), account.plan)?;
            if let Some(webhook) = account.webhook {
                upsert_preference(
                    &tx,
                    &NotificationPreference {
                        account_id: account.id,
                        webhook_url: Some(webhook.url),
                        enabled: webhook.enabled,
                    },
                )?;
            }
            for seed_domain in account.domains {
                let domain = MonitoredDomain::new(account.id, &seed_domain.name);
                added += tx.execute(
                    "INSERT OR IGNORE INTO domains (id, account_id, name, cert_status, registration_status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        domain.id,
                        domain.account_id,
                        domain.name,
                        to_text(&domain.cert_status)?,
                        to_text(&domain.registration_status)?,
                        domain.created_at,
                    ],
                )?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Registers or replaces an account.
    pub fn add_account(&self, id: AccountId, email: Option<&str>, plan: Plan) -> Result<(), StoreError> {
        let conn = self.conn()?;
        upsert_account(&conn, id, email, plan)
    }

    pub fn set_notification_preference(
        &self,
        preference: &NotificationPreference,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        upsert_preference(&conn, preference)
    }

    /// Every ledger entry, oldest first.
    pub fn alerts(&self) -> Result<Vec<AlertRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT domain_id, kind, threshold_days, sent_date, sent_at FROM alert_log ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AlertRecord {
                domain_id: row.get(0)?,
                kind: from_text(row, 1)?,
                threshold_days: row.get(2)?,
                sent_date: row.get(3)?,
                sent_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn upsert_account(
    conn: &Connection,
    id: AccountId,
    email: Option<&str>,
    plan: Plan,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO accounts (id, email, plan) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET email = excluded.email, plan = excluded.plan",
        params![id, email, to_text(&plan)?],
    )?;
    Ok(())
}

fn upsert_preference(conn: &Connection, preference: &NotificationPreference) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO notification_preferences (account_id, webhook_url, enabled) VALUES (?1, ?2, ?3)
         ON CONFLICT(account_id) DO UPDATE SET webhook_url = excluded.webhook_url, enabled = excluded.enabled",
        params![preference.account_id, preference.webhook_url, preference.enabled],
    )?;
    Ok(())
}

fn insert_domain_row(conn: &Connection, domain: &MonitoredDomain) -> Result<(), StoreError> {
    let result = conn.execute(
        &format!(
            "INSERT INTO domains ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            DOMAIN_COLUMNS
        ),
        params![
            domain.id,
            domain.account_id,
            domain.name,
            domain.cert_expiry,
            to_text(&domain.cert_status)?,
            domain.cert_issuer,
            domain.registration_expiry,
            to_text(&domain.registration_status)?,
            domain.registrar,
            domain.last_checked,
            domain.public_token,
            domain.created_at,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::Duplicate(domain.name.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

fn count_domains(conn: &Connection, account_id: AccountId) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM domains WHERE account_id = ?1",
        params![account_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn row_to_domain(row: &Row) -> rusqlite::Result<MonitoredDomain> {
    Ok(MonitoredDomain {
        id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
        cert_expiry: row.get(3)?,
        cert_status: from_text(row, 4)?,
        cert_issuer: row.get(5)?,
        registration_expiry: row.get(6)?,
        registration_status: from_text(row, 7)?,
        registrar: row.get(8)?,
        last_checked: row.get(9)?,
        public_token: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Stores a unit enum under its serde name, e.g. `expiring_soon`.
fn to_text<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(text)) => Ok(text),
        Ok(other) => Err(StoreError::Unavailable(format!("not a text value: {}", other))),
        Err(e) => Err(StoreError::Unavailable(e.to_string())),
    }
}

fn from_text<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_value(serde_json::Value::String(text))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[async_trait]
impl DomainStore for SqliteStore {
    async fn list_domains(&self) -> Result<Vec<MonitoredDomain>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM domains ORDER BY created_at, name",
            DOMAIN_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_domain)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_domain(&self, id: DomainId) -> Result<Option<MonitoredDomain>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM domains WHERE id = ?1", DOMAIN_COLUMNS),
                params![id],
                row_to_domain,
            )
            .optional()?)
    }

    async fn insert_domain(&self, domain: MonitoredDomain) -> Result<MonitoredDomain, StoreError> {
        let conn = self.conn()?;
        insert_domain_row(&conn, &domain)?;
        Ok(domain)
    }

    async fn insert_domain_within(
        &self,
        domain: MonitoredDomain,
        limit: usize,
    ) -> Result<MonitoredDomain, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = count_domains(&tx, domain.account_id)?;
        if current >= limit {
            return Err(StoreError::QuotaExceeded { current, limit });
        }
        insert_domain_row(&tx, &domain)?;
        tx.commit()?;
        Ok(domain)
    }

    async fn update_domain(&self, id: DomainId, update: &DomainUpdate) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE domains SET cert_expiry = ?2, cert_status = ?3, cert_issuer = ?4,
                 registration_expiry = ?5, registration_status = ?6, registrar = ?7, last_checked = ?8
             WHERE id = ?1",
            params![
                id,
                update.cert_expiry,
                to_text(&update.cert_status)?,
                update.cert_issuer,
                update.registration_expiry,
                to_text(&update.registration_status)?,
                update.registrar,
                update.checked_at,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("domain {id}")));
        }
        Ok(())
    }

    async fn delete_domain(&self, id: DomainId) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM domains WHERE id = ?1", params![id])?;
        if removed > 0 {
            tx.execute("DELETE FROM check_history WHERE domain_id = ?1", params![id])?;
            tx.execute("DELETE FROM alert_log WHERE domain_id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    async fn set_public_token(&self, id: DomainId, token: Option<String>) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE domains SET public_token = ?2 WHERE id = ?1",
            params![id, token],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("domain {id}")));
        }
        Ok(())
    }

    async fn find_by_public_token(&self, token: &str) -> Result<Option<MonitoredDomain>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM domains WHERE public_token = ?1", DOMAIN_COLUMNS),
                params![token],
                row_to_domain,
            )
            .optional()?)
    }

    async fn count_domains(&self, account_id: AccountId) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        count_domains(&conn, account_id)
    }

    async fn insert_history(&self, record: CheckHistoryRecord) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO check_history (domain_id, cert_status, registration_status, cert_expiry, registration_expiry, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.domain_id,
                to_text(&record.cert_status)?,
                to_text(&record.registration_status)?,
                record.cert_expiry,
                record.registration_expiry,
                record.checked_at,
            ],
        )?;
        Ok(())
    }

    async fn history(
        &self,
        domain_id: DomainId,
        limit: usize,
    ) -> Result<Vec<CheckHistoryRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT domain_id, cert_status, registration_status, cert_expiry, registration_expiry, checked_at
             FROM check_history WHERE domain_id = ?1
             ORDER BY checked_at DESC, id DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![domain_id, limit], |row| {
            Ok(CheckHistoryRecord {
                domain_id: row.get(0)?,
                cert_status: from_text(row, 1)?,
                registration_status: from_text(row, 2)?,
                cert_expiry: row.get(3)?,
                registration_expiry: row.get(4)?,
                checked_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn alert_exists(&self, key: &AlertKey) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM alert_log
                 WHERE domain_id = ?1 AND kind = ?2 AND threshold_days = ?3 AND sent_date = ?4)",
            params![key.domain_id, to_text(&key.kind)?, key.threshold_days, key.sent_date],
            |row| row.get(0),
        )?)
    }

    async fn insert_alert_if_absent(&self, record: AlertRecord) -> Result<Insertion, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO alert_log (domain_id, kind, threshold_days, sent_date, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.domain_id,
                to_text(&record.kind)?,
                record.threshold_days,
                record.sent_date,
                record.sent_at,
            ],
        )?;
        Ok(if changed == 0 {
            Insertion::AlreadyExisted
        } else {
            Insertion::Inserted
        })
    }

    async fn account_email(&self, account_id: AccountId) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let email: Option<Option<String>> = conn
            .query_row(
                "SELECT email FROM accounts WHERE id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(email.flatten())
    }

    async fn notification_preference(
        &self,
        account_id: AccountId,
    ) -> Result<Option<NotificationPreference>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT webhook_url, enabled FROM notification_preferences WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok(NotificationPreference {
                        account_id,
                        webhook_url: row.get(0)?,
                        enabled: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    async fn account_plan(&self, account_id: AccountId) -> Result<Plan, StoreError> {
        let conn = self.conn()?;
        let plan = conn
            .query_row(
                "SELECT plan FROM accounts WHERE id = ?1",
                params![account_id],
                |row| from_text::<Plan>(row, 0),
            )
            .optional()?;
        Ok(plan.unwrap_or_default())
    }
}
