//! Organization-scoped password secrets

use crate::types::OrganizationId;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Secret value key holding the user name
pub const USERNAME_KEY: &str = "username";

/// Secret value key holding the password
pub const PASSWORD_KEY: &str = "password";

/// Username and password resolved from a secret
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordSecret {
    username: String,
    password: String,
}

impl PasswordSecret {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for PasswordSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordSecret")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretStoreError {
    #[error("secret '{secret_id}' not found for organization {organization_id}")]
    NotFound {
        organization_id: OrganizationId,
        secret_id: String,
    },

    #[error("secret '{secret_id}' is not a password secret: {reason}")]
    Malformed { secret_id: String, reason: String },

    #[error("secret store unavailable: {0}")]
    Backend(String),
}

/// Lookup of password secrets, scoped to an organization
#[async_trait]
pub trait PasswordSecretStore: Send + Sync {
    async fn get_secret(
        &self,
        organization_id: OrganizationId,
        secret_id: &str,
    ) -> Result<PasswordSecret, SecretStoreError>;
}

/// One stored secret as it appears in a secrets file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub organization_id: OrganizationId,
    pub secret_id: String,
    pub values: BTreeMap<String, String>,
}

/// In-memory secret store keyed by organization and secret id
#[derive(Default)]
pub struct InMemoryPasswordSecretStore {
    secrets: DashMap<(OrganizationId, String), BTreeMap<String, String>>,
}

impl InMemoryPasswordSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = SecretRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert_values(record.organization_id, record.secret_id, record.values);
        }
        store
    }

    /// Store a password secret
    pub fn insert(
        &self,
        organization_id: OrganizationId,
        secret_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        let values = BTreeMap::from([
            (USERNAME_KEY.to_string(), username.into()),
            (PASSWORD_KEY.to_string(), password.into()),
        ]);
        self.insert_values(organization_id, secret_id, values);
    }

    /// Store raw secret values; lookups fail as malformed without both password keys
    pub fn insert_values(
        &self,
        organization_id: OrganizationId,
        secret_id: impl Into<String>,
        values: BTreeMap<String, String>,
    ) {
        self.secrets
            .insert((organization_id, secret_id.into()), values);
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[async_trait]
impl PasswordSecretStore for InMemoryPasswordSecretStore {
    async fn get_secret(
        &self,
        organization_id: OrganizationId,
        secret_id: &str,
    ) -> Result<PasswordSecret, SecretStoreError> {
        let values = self
            .secrets
            .get(&(organization_id, secret_id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SecretStoreError::NotFound {
                organization_id,
                secret_id: secret_id.to_string(),
            })?;

        let value = |key: &str| {
            values
                .get(key)
                .cloned()
                .ok_or_else(|| SecretStoreError::Malformed {
                    secret_id: secret_id.to_string(),
                    reason: format!("missing '{}' value", key),
                })
        };

        Ok(PasswordSecret::new(value(USERNAME_KEY)?, value(PASSWORD_KEY)?))
    }
}
