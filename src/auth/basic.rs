use super::Authenticator;
use crate::credentials::CredentialType;
use crate::error::{CoreError, CoreResult};
use crate::request::Request;
use async_trait::async_trait;
use base64::Engine;

pub struct BasicAuthenticator {
    username: String,
    password: String,
}

impl BasicAuthenticator {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(&self, request: &mut Request) -> CoreResult<()> {
        let raw = format!("{}:{}", self.username, self.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw.as_bytes());
        request.set_header("Authorization", format!("Basic {encoded}"));
        Ok(())
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::BasicAuth
    }

    fn validate(&self) -> CoreResult<()> {
        if self.username.is_empty() {
            return Err(CoreError::validation("username", "basic auth username must not be empty"));
        }
        // Empty password is explicitly permitted (spec §4.2).
        Ok(())
    }
}
