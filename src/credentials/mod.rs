//! Credential envelope encryption and the credential storage contract.

pub mod envelope;
pub mod store;

pub use envelope::{EncryptedData, SecretKey};
pub use store::{Credential, CredentialId, CredentialStore, CredentialType};
