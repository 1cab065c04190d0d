//! Authenticators: pluggable request-signing strategies dispatched on
//! `CredentialType`.

pub mod api_key;
pub mod basic;
pub mod bearer;
pub mod oauth2;

use crate::credentials::{Credential, CredentialType};
use crate::error::{CoreError, CoreResult};
use crate::request::Request;
use async_trait::async_trait;
use std::sync::Arc;

/// Object-safe core authenticator capability. Every authenticator
/// implements this; OAuth2 additionally implements
/// [`RefreshableAuthenticator`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Mutate `request` in place to attach credentials (headers/query).
    async fn authenticate(&self, request: &mut Request) -> CoreResult<()>;

    fn credential_type(&self) -> CredentialType;

    /// Structural validation of the authenticator's own configuration
    /// (not the network-dependent parts — those surface at use time).
    fn validate(&self) -> CoreResult<()>;
}

/// Optional capability for authenticators whose credential can expire
/// and be refreshed (currently only OAuth2). Kept as a separate trait
/// rather than default methods on `Authenticator` so the common case
/// (api key/bearer/basic) never carries refresh plumbing it can't use.
#[async_trait]
pub trait RefreshableAuthenticator: Authenticator {
    async fn needs_refresh(&self) -> bool;
    async fn refresh(&self) -> CoreResult<()>;
}

pub use api_key::{ApiKeyAuthenticator, ApiKeyLocation};
pub use basic::BasicAuthenticator;
pub use bearer::BearerAuthenticator;
pub use oauth2::{GrantType, OAuth2Authenticator, OAuth2Config};

pub fn api_key(header_or_query: ApiKeyLocation, name: String, value: String) -> Arc<dyn Authenticator> {
    Arc::new(ApiKeyAuthenticator::new(header_or_query, name, value))
}

pub fn bearer(token: String, scheme: Option<String>) -> Arc<dyn Authenticator> {
    Arc::new(BearerAuthenticator::new(token, scheme))
}

pub fn basic(username: String, password: String) -> Arc<dyn Authenticator> {
    Arc::new(BasicAuthenticator::new(username, password))
}

/// Dispatches on `credential.kind` (spec §4.2 "Factory dispatches on
/// `credentials.type`; unknown type → validation error"). Builds the
/// concrete authenticator straight out of the credential's live `data`
/// map, keyed the same way each authenticator's own fields are named.
/// `CredentialType::Custom` has no registered authenticator and is
/// always a validation error.
pub fn from_credential(credential: &Credential) -> CoreResult<Arc<dyn Authenticator>> {
    let data = credential
        .data
        .as_ref()
        .ok_or_else(|| CoreError::validation("data", "credential has no live data to build an authenticator from"))?;

    match credential.kind {
        CredentialType::ApiKey => {
            let value = data
                .get("value")
                .cloned()
                .ok_or_else(|| CoreError::validation("value", "api_key credential is missing 'value'"))?;
            let name = data.get("name").cloned().unwrap_or_else(|| "X-API-Key".to_string());
            let location = match data.get("location").map(String::as_str) {
                Some("query") => ApiKeyLocation::Query,
                _ => ApiKeyLocation::Header,
            };
            Ok(api_key(location, name, value))
        }
        CredentialType::BearerToken => {
            let token = data
                .get("token")
                .cloned()
                .ok_or_else(|| CoreError::validation("token", "bearer_token credential is missing 'token'"))?;
            Ok(bearer(token, data.get("scheme").cloned()))
        }
        CredentialType::BasicAuth => {
            let username = data
                .get("username")
                .cloned()
                .ok_or_else(|| CoreError::validation("username", "basic_auth credential is missing 'username'"))?;
            let password = data.get("password").cloned().unwrap_or_default();
            Ok(basic(username, password))
        }
        CredentialType::OAuth2 => {
            let token_url = data
                .get("token_url")
                .cloned()
                .ok_or_else(|| CoreError::validation("token_url", "oauth2 credential is missing 'token_url'"))?;
            let client_id = data
                .get("client_id")
                .cloned()
                .ok_or_else(|| CoreError::validation("client_id", "oauth2 credential is missing 'client_id'"))?;
            let grant_type = match data.get("grant_type").map(String::as_str) {
                Some("password") => GrantType::Password,
                Some("refresh_token") => GrantType::RefreshToken,
                Some("authorization_code") => GrantType::AuthorizationCode,
                _ => GrantType::ClientCredentials,
            };
            let scopes = data
                .get("scopes")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            let config = OAuth2Config {
                token_url,
                grant_type,
                client_id,
                client_secret: data.get("client_secret").cloned(),
                username: data.get("username").cloned(),
                password: data.get("password").cloned(),
                scopes,
                audience: data.get("audience").cloned(),
                refresh_token: data.get("refresh_token").cloned(),
                code: data.get("code").cloned(),
                redirect_uri: data.get("redirect_uri").cloned(),
            };
            Ok(OAuth2Authenticator::new(config, reqwest::Client::new()))
        }
        CredentialType::Custom => Err(CoreError::validation(
            "type",
            "no authenticator is registered for credential type 'custom'",
        )),
    }
}

#[cfg(test)]
mod factory_tests {
    use super::*;
    use std::collections::BTreeMap;

    fn credential(kind: CredentialType, data: &[(&str, &str)]) -> Credential {
        let map = data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Credential::live(crate::credentials::CredentialId("cred-1".into()), kind, map)
    }

    #[tokio::test]
    async fn builds_api_key_authenticator_from_credential() {
        let cred = credential(CredentialType::ApiKey, &[("name", "X-Api-Key"), ("value", "secret")]);
        let auth = from_credential(&cred).unwrap();
        assert_eq!(auth.credential_type(), CredentialType::ApiKey);

        let mut req = Request::new(crate::request::Method::Get, "https://example.com");
        auth.authenticate(&mut req).await.unwrap();
        assert_eq!(req.headers.get("X-Api-Key"), Some(&"secret".to_string()));
    }

    #[tokio::test]
    async fn builds_bearer_authenticator_from_credential() {
        let cred = credential(CredentialType::BearerToken, &[("token", "tok-1")]);
        let auth = from_credential(&cred).unwrap();

        let mut req = Request::new(crate::request::Method::Get, "https://example.com");
        auth.authenticate(&mut req).await.unwrap();
        assert_eq!(req.headers.get("Authorization"), Some(&"Bearer tok-1".to_string()));
    }

    #[tokio::test]
    async fn builds_basic_authenticator_from_credential() {
        let cred = credential(CredentialType::BasicAuth, &[("username", "alice"), ("password", "s3cret")]);
        let auth = from_credential(&cred).unwrap();
        assert_eq!(auth.credential_type(), CredentialType::BasicAuth);
    }

    #[test]
    fn builds_oauth2_authenticator_from_credential() {
        let cred = credential(
            CredentialType::OAuth2,
            &[("token_url", "https://auth.example.com/token"), ("client_id", "client-1")],
        );
        let auth = from_credential(&cred).unwrap();
        assert_eq!(auth.credential_type(), CredentialType::OAuth2);
    }

    #[test]
    fn custom_credential_type_is_a_validation_error() {
        let cred = credential(CredentialType::Custom, &[]);
        let err = from_credential(&cred).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn missing_required_field_is_a_validation_error() {
        let cred = credential(CredentialType::BearerToken, &[]);
        let err = from_credential(&cred).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn sealed_credential_without_live_data_is_rejected() {
        let cred = credential(CredentialType::ApiKey, &[("name", "X"), ("value", "v")]);
        let sealed_shape = Credential { data: None, ..cred };
        let err = from_credential(&sealed_shape).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }
}
