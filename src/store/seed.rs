//! YAML seed files: accounts, webhooks and domains loaded at startup.

use super::StoreError;
use crate::core::{AccountId, Plan};
use crate::domain_name;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of a seed file.
///
/// ```yaml
/// accounts:
///   - id: 6f1c2d9e-2c57-4f57-9a4b-0c7b0c3f7a10
///     email: ops@example.com
///     plan: pro
///     webhook:
///       url: https://hooks.slack.com/services/T000/B000/XXX
///     domains:
///       - name: example.com
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeedData {
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedAccount {
    pub id: AccountId,
    pub email: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub webhook: Option<SeedWebhook>,
    #[serde(default)]
    pub domains: Vec<SeedDomain>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedWebhook {
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedDomain {
    pub name: String,
}

fn default_true() -> bool {
    true
}

impl SeedData {
    /// Reads and parses a YAML seed file.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Seed(format!("{}: {}", path.display(), e)))?;
        serde_yml::from_str(&content)
            .map_err(|e| StoreError::Seed(format!("{}: {}", path.display(), e)))
    }

    /// Normalizes every domain name the same way as domains added at runtime,
    /// rejecting invalid names and names listed twice for one account.
    pub fn normalized(mut self) -> Result<Self, StoreError> {
        for account in &mut self.accounts {
            let mut seen: Vec<String> = Vec::with_capacity(account.domains.len());
            for domain in &mut account.domains {
                let name = domain_name::parse(&domain.name)
                    .map_err(|e| StoreError::Seed(e.to_string()))?;
                if seen.contains(&name) {
                    return Err(StoreError::Seed(format!(
                        "domain '{}' listed twice for account {}",
                        name, account.id
                    )));
                }
                seen.push(name.clone());
                domain.name = name;
            }
        }
        Ok(self)
    }
}
