//! Secret-store lookups for credentials that are not written inline in the
//! configuration file.

use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::path::Path;

const PASSWORD_FIELD: &str = "password";

/// A named secret store. Each key holds a small set of fields such as
/// `user` and `password`.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str, field: &str) -> Option<String>;
}

/// Secret store backed by a JSON document of the form
/// `{ "<key>": { "user": "...", "password": "..." } }`.
#[derive(Debug, Clone, Default)]
pub struct FileSecretStore {
    entries: HashMap<String, HashMap<String, String>>,
}

impl FileSecretStore {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to read secret store {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content).map_err(|e| match e {
            AppError::Configuration(msg) => {
                AppError::Configuration(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let entries = serde_json::from_str(content)
            .map_err(|e| AppError::Configuration(format!("Invalid secret store: {}", e)))?;
        Ok(Self { entries })
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str, field: &str) -> Option<String> {
        self.entries.get(key)?.get(field).cloned()
    }
}

/// Resolves a password given either literally or as a secret-store key.
/// The key takes precedence when both are present.
pub fn resolve_secret(
    store: &dyn SecretStore,
    literal: Option<&str>,
    key: Option<&str>,
) -> Result<String> {
    if let Some(key) = key {
        return store.get(key, PASSWORD_FIELD).ok_or_else(|| {
            AppError::Credentials(format!("Missing credential in vault with key {}", key))
        });
    }

    literal.map(str::to_string).ok_or_else(|| {
        AppError::Credentials(
            "Either the password or the credentials-provider key must be defined".to_string(),
        )
    })
}
