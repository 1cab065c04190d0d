use super::{Authenticator, RefreshableAuthenticator};
use crate::credentials::CredentialType;
use crate::error::{CoreError, CoreResult};
use crate::request::Request;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    ClientCredentials,
    Password,
    RefreshToken,
    AuthorizationCode,
}

impl GrantType {
    fn as_str(&self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
            GrantType::AuthorizationCode => "authorization_code",
        }
    }
}

/// Static configuration for an OAuth2 authenticator — everything except
/// the mutable token state, which lives in [`TokenState`].
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub token_url: String,
    pub grant_type: GrantType,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scopes: Vec<String>,
    pub audience: Option<String>,
    /// Seeded refresh token, for the `refresh_token` grant or to prime a
    /// credential that was issued out of band (e.g. a desktop consent flow).
    pub refresh_token: Option<String>,
    /// Seeded authorization code, for the `authorization_code` grant.
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    #[allow(dead_code)]
    scope: Option<String>,
}

/// OAuth2 authenticator with mutex-coalesced token refresh (spec §4.2,
/// §5): concurrent callers that observe an expired/missing token all
/// block on the same mutex; only the first to acquire it performs the
/// network refresh, the rest see the now-fresh token after re-checking
/// expiry post-lock.
pub struct OAuth2Authenticator {
    config: OAuth2Config,
    state: Mutex<TokenState>,
    http: reqwest::Client,
}

const REFRESH_SKEW: chrono::Duration = chrono::Duration::seconds(60);

impl OAuth2Authenticator {
    pub fn new(config: OAuth2Config, http: reqwest::Client) -> Arc<Self> {
        let refresh_token = config.refresh_token.clone();
        Arc::new(Self {
            config,
            state: Mutex::new(TokenState {
                access_token: None,
                refresh_token,
                expiry: None,
            }),
            http,
        })
    }

    async fn needs_refresh_locked(state: &TokenState) -> bool {
        match (&state.access_token, state.expiry) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(expiry)) => expiry - Utc::now() < REFRESH_SKEW,
        }
    }

    async fn do_refresh(&self, state: &mut TokenState) -> CoreResult<()> {
        let mut form: Vec<(String, String)> = vec![
            ("grant_type".to_string(), self.config.grant_type.as_str().to_string()),
            ("client_id".to_string(), self.config.client_id.clone()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }
        if !self.config.scopes.is_empty() {
            form.push(("scope".to_string(), self.config.scopes.join(" ")));
        }
        if let Some(audience) = &self.config.audience {
            form.push(("audience".to_string(), audience.clone()));
        }

        match self.config.grant_type {
            GrantType::Password => {
                if let Some(u) = &self.config.username {
                    form.push(("username".to_string(), u.clone()));
                }
                if let Some(p) = &self.config.password {
                    form.push(("password".to_string(), p.clone()));
                }
            }
            GrantType::RefreshToken => {
                let token = state
                    .refresh_token
                    .clone()
                    .or_else(|| self.config.refresh_token.clone())
                    .ok_or_else(|| CoreError::Auth("no refresh_token available".into()))?;
                form.push(("refresh_token".to_string(), token));
            }
            GrantType::AuthorizationCode => {
                let code = self
                    .config
                    .code
                    .clone()
                    .ok_or_else(|| CoreError::Auth("no authorization code available".into()))?;
                form.push(("code".to_string(), code));
                if let Some(redirect) = &self.config.redirect_uri {
                    form.push(("redirect_uri".to_string(), redirect.clone()));
                }
            }
            GrantType::ClientCredentials => {}
        }

        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(CoreError::from)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = resp.json().await.map_err(CoreError::from)?;
        state.access_token = Some(parsed.access_token);
        state.expiry = parsed
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        if let Some(rt) = parsed.refresh_token {
            state.refresh_token = Some(rt);
        }
        Ok(())
    }
}

#[async_trait]
impl Authenticator for OAuth2Authenticator {
    async fn authenticate(&self, request: &mut Request) -> CoreResult<()> {
        self.refresh().await?;
        let state = self.state.lock().await;
        let token = state
            .access_token
            .as_ref()
            .ok_or_else(|| CoreError::Auth("no access token after refresh".into()))?;
        request.set_header("Authorization", format!("Bearer {token}"));
        Ok(())
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::OAuth2
    }

    fn validate(&self) -> CoreResult<()> {
        if self.config.token_url.is_empty() {
            return Err(CoreError::validation("token_url", "must not be empty"));
        }
        if self.config.client_id.is_empty() {
            return Err(CoreError::validation("client_id", "must not be empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshableAuthenticator for OAuth2Authenticator {
    async fn needs_refresh(&self) -> bool {
        let state = self.state.lock().await;
        Self::needs_refresh_locked(&state).await
    }

    async fn refresh(&self) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        // Double-checked: another caller may have refreshed while we
        // waited for the lock.
        if !Self::needs_refresh_locked(&state).await {
            return Ok(());
        }
        self.do_refresh(&mut state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(token_url: String) -> OAuth2Config {
        OAuth2Config {
            token_url,
            grant_type: GrantType::ClientCredentials,
            client_id: "client-1".into(),
            client_secret: Some("shh".into()),
            username: None,
            password: None,
            scopes: vec!["read".into(), "write".into()],
            audience: None,
            refresh_token: None,
            code: None,
            redirect_uri: None,
        }
    }

    #[tokio::test]
    async fn refresh_fetches_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-abc",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = OAuth2Authenticator::new(config(format!("{}/token", server.uri())), reqwest::Client::new());
        assert!(auth.needs_refresh().await);
        auth.refresh().await.unwrap();
        assert!(!auth.needs_refresh().await);

        let mut req = Request::new(crate::request::Method::Get, "https://api.example.com");
        auth.authenticate(&mut req).await.unwrap();
        assert_eq!(req.headers.get("Authorization"), Some(&"Bearer tok-abc".to_string()));
    }

    #[tokio::test]
    async fn concurrent_refresh_calls_coalesce_to_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-xyz",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = OAuth2Authenticator::new(config(format!("{}/token", server.uri())), reqwest::Client::new());
        let (a, b, c) = tokio::join!(auth.refresh(), auth.refresh(), auth.refresh());
        a.unwrap();
        b.unwrap();
        c.unwrap();
    }

    #[tokio::test]
    async fn non_200_response_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let auth = OAuth2Authenticator::new(config(format!("{}/token", server.uri())), reqwest::Client::new());
        let err = auth.refresh().await.unwrap_err();
        assert!(matches!(err, CoreError::Http { status: 401, .. }));
    }
}
