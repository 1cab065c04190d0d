use super::templating::{contains_template, expand_string, expand_value};
use super::{elapsed_ms, ActionErrorCode, ActionResult};
use crate::error::{CoreError, CoreResult};
use crate::http_client::ResilientClient;
use crate::request::{Body, Method, Request};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpActionConfig {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub body_template: Option<Value>,
    pub timeout_secs: Option<u64>,
    /// HTTP status codes considered a success; defaults to the 2xx range.
    pub success_codes: Option<Vec<u16>>,
    #[serde(default = "default_response_type")]
    pub response_type: ResponseType,
}

fn default_response_type() -> ResponseType {
    ResponseType::Json
}

impl HttpActionConfig {
    /// Structural validation, independent of the step's input parameters.
    pub fn validate(&self) -> CoreResult<()> {
        if self.url.trim().is_empty() {
            return Err(CoreError::validation("url", "must not be empty"));
        }
        if self.method.trim().is_empty() {
            return Err(CoreError::validation("method", "must not be empty"));
        }
        let method = Method::parse(&self.method)
            .ok_or_else(|| CoreError::validation("method", format!("unsupported HTTP method '{}'", self.method)))?;
        let _ = method;

        // A templated URL can't be checked for well-formedness until the
        // step's input parameters are known, so literal-URL validation is
        // skipped entirely when the URL still contains a template marker.
        if !contains_template(&self.url) && !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(CoreError::validation("url", "must be an absolute http(s) URL"));
        }
        Ok(())
    }

    fn is_success(&self, status: u16) -> bool {
        match &self.success_codes {
            Some(codes) => codes.contains(&status),
            None => (200..300).contains(&status),
        }
    }
}

/// Expand `url` and whichever of `body`/`body_template` is set against
/// `params`, then dispatch through the resilient client.
pub async fn execute(
    config: &HttpActionConfig,
    params: &Value,
    client: &ResilientClient,
    cancel: &CancellationToken,
) -> CoreResult<ActionResult> {
    let start = Instant::now();
    let executed_at = Utc::now();

    if let Err(e) = config.validate() {
        return Ok(ActionResult::failure(
            e.to_string(),
            ActionErrorCode::InvalidConfig.as_str(),
            elapsed_ms(start),
            executed_at,
        ));
    }

    let method = Method::parse(&config.method)
        .ok_or_else(|| CoreError::validation("method", format!("unsupported HTTP method '{}'", config.method)))?;
    let url = expand_string(&config.url, params);

    let mut request = Request::new(method, url);
    for (k, v) in &config.headers {
        request.set_header(expand_string(k, params), expand_string(v, params));
    }
    for (k, v) in &config.query_params {
        request
            .query_params
            .insert(expand_string(k, params), expand_string(v, params));
    }

    request.body = if let Some(template) = &config.body_template {
        Body::Json(expand_value(template, params))
    } else if let Some(body) = &config.body {
        Body::Json(body.clone())
    } else {
        Body::Empty
    };

    let timeout = config.timeout_secs.map(Duration::from_secs);
    let result = if let Some(timeout) = timeout {
        let local_cancel = cancel.child_token();
        tokio::select! {
            r = client.do_request(request, &local_cancel) => r,
            _ = tokio::time::sleep(timeout) => {
                local_cancel.cancel();
                Err(CoreError::Timeout)
            }
        }
    } else {
        client.do_request(request, cancel).await
    };

    match result {
        Ok(resp) if config.is_success(resp.status) => {
            let status = resp.status;
            let data = match config.response_type {
                ResponseType::Json => resp.json().unwrap_or(Value::Null),
                ResponseType::Text => Value::String(resp.text()),
            };
            Ok(ActionResult::success(data, status, elapsed_ms(start), executed_at))
        }
        Ok(resp) => Ok(ActionResult::failure(
            format!("unexpected status {}", resp.status),
            ActionErrorCode::DeliveryFailed.as_str(),
            elapsed_ms(start),
            executed_at,
        )),
        Err(e) => Ok(ActionResult::from_error(&e, elapsed_ms(start), executed_at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ResilientClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn base_config(url: String) -> HttpActionConfig {
        HttpActionConfig {
            url,
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            body: None,
            body_template: None,
            timeout_secs: Some(5),
            success_codes: None,
            response_type: ResponseType::Json,
        }
    }

    #[test]
    fn validate_rejects_missing_url() {
        let mut cfg = base_config("x".into());
        cfg.url = "".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_method() {
        let mut cfg = base_config("https://example.com".into());
        cfg.method = "FETCH".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_skips_literal_url_check_when_templated() {
        let cfg = base_config("{{base_url}}/things".into());
        assert!(cfg.validate().is_ok());
    }

    #[tokio::test]
    async fn executes_and_expands_url_template() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let mut cfg = base_config(format!("{}/users/{{{{user_id}}}}", server.uri()));
        cfg.response_type = ResponseType::Json;
        let client = ResilientClient::builder().build().unwrap();
        let cancel = CancellationToken::new();
        let params = json!({"user_id": 42});

        let result = execute(&cfg, &params, &client, &cancel).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"ok": true})));
    }
}
