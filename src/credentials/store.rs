// Credential model and the storage contract the Registry (integration
// module) consumes. No concrete store ships here — persistence engines
// are explicitly out of scope — but the trait fixes the semantics any
// implementation must honor: `data` and `encrypted` are mutually
// exclusive, and the persisted form must never carry `data`.

use crate::credentials::envelope::{self, EncryptedData, SecretKey};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Newtype credential identifier — see `TenantId` for the rationale.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CredentialId(pub String);

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    ApiKey,
    BearerToken,
    BasicAuth,
    OAuth2,
    Custom,
}

/// Authenticating material for an integration call.
///
/// `data` and `encrypted` are mutually exclusive by construction: the two
/// constructors (`Credential::live`, `Credential::at_rest`) are the only
/// way to build one, and each populates exactly one of the two fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub name: Option<String>,
    /// Plaintext, in-memory only. Never serialized when `encrypted` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<EncryptedData>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub refresh_at: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Credential {
    /// Construct the in-memory "live" form: `data` populated, `encrypted`
    /// absent.
    pub fn live(
        id: CredentialId,
        kind: CredentialType,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id,
            kind,
            name: None,
            data: Some(data),
            encrypted: None,
            expires_at: None,
            refresh_at: None,
            metadata: None,
        }
    }

    /// Seal this credential's `data` for persistence, returning a new
    /// value with `data = None` and `encrypted = Some(..)`.
    pub fn seal(&self, master_key: &SecretKey) -> CoreResult<Self> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| CoreError::validation("data", "credential has no live data to seal"))?;
        let encrypted = envelope::encrypt_creds(data, master_key)?;
        Ok(Self {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            data: None,
            encrypted: Some(encrypted),
            expires_at: self.expires_at,
            refresh_at: self.refresh_at,
            metadata: self.metadata.clone(),
        })
    }

    /// Reverse of [`Credential::seal`]: unwrap `encrypted` into `data`.
    pub fn unseal(&self, master_key: &SecretKey) -> CoreResult<Self> {
        let encrypted = self
            .encrypted
            .as_ref()
            .ok_or_else(|| CoreError::validation("encrypted", "credential has no at-rest form to unseal"))?;
        let data = envelope::decrypt_creds(encrypted, master_key)?;
        Ok(Self {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            data: Some(data),
            encrypted: None,
            expires_at: self.expires_at,
            refresh_at: self.refresh_at,
            metadata: self.metadata.clone(),
        })
    }

    pub fn is_persistable(&self) -> bool {
        self.data.is_none() && self.encrypted.is_some()
    }
}

/// Storage contract consumed by the integration registry. Implementations
/// own durability; this crate only fixes the semantics (spec §6
/// "Persistence contract").
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, id: &CredentialId) -> CoreResult<Option<Credential>>;
    async fn put(&self, credential: Credential) -> CoreResult<()>;
    async fn delete(&self, id: &CredentialId) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretKey {
        SecretKey::from_bytes([7u8; 32])
    }

    fn sample() -> Credential {
        let mut data = BTreeMap::new();
        data.insert("api_key".to_string(), "sk-test".to_string());
        Credential::live(CredentialId("cred-1".into()), CredentialType::ApiKey, data)
    }

    #[test]
    fn seal_then_unseal_round_trips() {
        let k = key();
        let live = sample();
        let sealed = live.seal(&k).unwrap();
        assert!(sealed.is_persistable());
        assert!(sealed.data.is_none());

        let unsealed = sealed.unseal(&k).unwrap();
        assert_eq!(unsealed.data, live.data);
    }

    #[test]
    fn sealing_without_data_is_a_validation_error() {
        let k = key();
        let mut cred = sample();
        cred.data = None;
        let err = cred.seal(&k).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn live_credential_is_not_persistable() {
        assert!(!sample().is_persistable());
    }
}
