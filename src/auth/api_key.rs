use super::Authenticator;
use crate::credentials::CredentialType;
use crate::error::{CoreError, CoreResult};
use crate::request::Request;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
}

/// Attaches `name=value` to either the request headers or query params.
/// Default location and header name (`X-API-Key`) are the caller's
/// responsibility to supply — this type has no implicit default because
/// the factory that constructs it already knows the credential's stored
/// location.
pub struct ApiKeyAuthenticator {
    location: ApiKeyLocation,
    name: String,
    value: String,
}

impl ApiKeyAuthenticator {
    pub fn new(location: ApiKeyLocation, name: String, value: String) -> Self {
        Self { location, name, value }
    }

    pub fn default_header(value: String) -> Self {
        Self::new(ApiKeyLocation::Header, "X-API-Key".to_string(), value)
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &mut Request) -> CoreResult<()> {
        match self.location {
            ApiKeyLocation::Header => request.set_header(self.name.clone(), self.value.clone()),
            ApiKeyLocation::Query => {
                request.query_params.insert(self.name.clone(), self.value.clone());
            }
        }
        Ok(())
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::ApiKey
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::validation("name", "api key name must not be empty"));
        }
        if self.value.is_empty() {
            return Err(CoreError::validation("value", "api key value must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    #[tokio::test]
    async fn attaches_header_by_default() {
        let auth = ApiKeyAuthenticator::default_header("secret123".into());
        let mut req = Request::new(Method::Get, "https://example.com");
        auth.authenticate(&mut req).await.unwrap();
        assert_eq!(req.headers.get("X-API-Key"), Some(&"secret123".to_string()));
    }

    #[tokio::test]
    async fn attaches_to_query_when_configured() {
        let auth = ApiKeyAuthenticator::new(ApiKeyLocation::Query, "api_key".into(), "secret".into());
        let mut req = Request::new(Method::Get, "https://example.com");
        auth.authenticate(&mut req).await.unwrap();
        assert_eq!(req.query_params.get("api_key"), Some(&"secret".to_string()));
        assert!(req.headers.is_empty());
    }

    #[test]
    fn rejects_empty_name() {
        let auth = ApiKeyAuthenticator::new(ApiKeyLocation::Header, "".into(), "v".into());
        assert!(auth.validate().is_err());
    }
}
