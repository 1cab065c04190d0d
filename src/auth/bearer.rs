use super::Authenticator;
use crate::credentials::CredentialType;
use crate::error::{CoreError, CoreResult};
use crate::request::Request;
use async_trait::async_trait;

pub struct BearerAuthenticator {
    token: String,
    scheme: String,
}

impl BearerAuthenticator {
    pub fn new(token: String, scheme: Option<String>) -> Self {
        Self {
            token,
            scheme: scheme.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    async fn authenticate(&self, request: &mut Request) -> CoreResult<()> {
        request.set_header("Authorization", format!("{} {}", self.scheme, self.token));
        Ok(())
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::BearerToken
    }

    fn validate(&self) -> CoreResult<()> {
        if self.token.is_empty() {
            return Err(CoreError::validation("token", "bearer token must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    #[tokio::test]
    async fn sets_authorization_header_with_default_scheme() {
        let auth = BearerAuthenticator::new("tok123".into(), None);
        let mut req = Request::new(Method::Get, "https://example.com");
        auth.authenticate(&mut req).await.unwrap();
        assert_eq!(req.headers.get("Authorization"), Some(&"Bearer tok123".to_string()));
    }

    #[tokio::test]
    async fn supports_custom_scheme() {
        let auth = BearerAuthenticator::new("tok123".into(), Some("Token".into()));
        let mut req = Request::new(Method::Get, "https://example.com");
        auth.authenticate(&mut req).await.unwrap();
        assert_eq!(req.headers.get("Authorization"), Some(&"Token tok123".to_string()));
    }
}
