use super::templating::{contains_template, expand_value};
use super::{elapsed_ms, ActionErrorCode, ActionResult};
use crate::error::{CoreError, CoreResult};
use crate::http_client::ResilientClient;
use crate::request::{Body, Method, Request};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookActionConfig {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    pub payload: Option<Value>,
    pub payload_template: Option<Value>,
    pub timeout_secs: Option<u64>,
    pub success_codes: Option<Vec<u16>>,
    pub signature_header: Option<String>,
    pub signature_secret: Option<String>,
    #[serde(default)]
    pub include_timestamp: bool,
}

impl WebhookActionConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.url.trim().is_empty() {
            return Err(CoreError::validation("url", "must not be empty"));
        }
        crate::request::Method::parse(&self.method)
            .ok_or_else(|| CoreError::validation("method", format!("unsupported HTTP method '{}'", self.method)))?;
        if !contains_template(&self.url) && !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(CoreError::validation("url", "must be an absolute http(s) URL"));
        }
        match (&self.signature_header, &self.signature_secret) {
            (Some(_), Some(_)) | (None, None) => {}
            _ => {
                return Err(CoreError::validation(
                    "signature_header/signature_secret",
                    "must be either both present or both absent",
                ))
            }
        }
        Ok(())
    }
}

fn build_payload(config: &WebhookActionConfig, params: &Value) -> Value {
    if let Some(payload) = &config.payload {
        return payload.clone();
    }
    if let Some(template) = &config.payload_template {
        return expand_value(template, params);
    }
    params.get("event").cloned().unwrap_or_else(|| params.clone())
}

fn sign(payload_bytes: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload_bytes);
    let digest = mac.finalize().into_bytes();
    format!("sha256={}", hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Strips any `sha256=` prefix from `provided` and constant-time-compares
/// against the locally computed signature. Never short-circuits on
/// length or early byte mismatch.
pub fn verify_signature(payload: &[u8], provided: &str, secret: &str) -> bool {
    let expected = sign(payload, secret);
    let expected_hex = expected.trim_start_matches("sha256=");
    let provided_hex = provided.trim_start_matches("sha256=");
    let expected_bytes = expected_hex.as_bytes();
    let provided_bytes = provided_hex.as_bytes();
    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }
    expected_bytes.ct_eq(provided_bytes).into()
}

fn delivery_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub async fn execute(
    config: &WebhookActionConfig,
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

    let method = Method::parse(&config.method).expect("validated above");
    let payload = build_payload(config, params);
    let payload_bytes = match serde_json::to_vec(&payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            return Ok(ActionResult::failure(
                CoreError::from(e).to_string(),
                ActionErrorCode::PayloadSerializeFailed.as_str(),
                elapsed_ms(start),
                executed_at,
            ))
        }
    };

    let delivery = delivery_id();
    let mut request = Request::new(method, config.url.clone());
    for (k, v) in &config.headers {
        request.set_header(k.clone(), v.clone());
    }
    for (k, v) in &config.query_params {
        request.query_params.insert(k.clone(), v.clone());
    }
    request.set_header("X-Webhook-Delivery-ID", delivery.clone());
    if config.include_timestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        request.set_header("X-Webhook-Timestamp", now.to_string());
    }
    let signature = if let (Some(header), Some(secret)) = (&config.signature_header, &config.signature_secret) {
        let sig = sign(&payload_bytes, secret);
        request.set_header(header.clone(), sig.clone());
        Some(sig)
    } else {
        None
    };
    request.body = Body::Raw {
        content_type: "application/json".to_string(),
        bytes: payload_bytes,
    };

    let result = client.do_request(request, cancel).await;
    match result {
        Ok(resp)
            if config
                .success_codes
                .as_ref()
                .map(|c| c.contains(&resp.status))
                .unwrap_or((200..300).contains(&resp.status)) =>
        {
            let status = resp.status;
            let mut data = json!({
                "delivery_id": delivery,
                "status_code": status,
                "response": resp.json().unwrap_or(Value::Null),
            });
            if let Some(sig) = signature {
                data["signature"] = Value::String(sig);
            }
            Ok(ActionResult::success(data, status, elapsed_ms(start), executed_at))
        }
        Ok(resp) => Ok(ActionResult::failure(
            format!("unexpected status {}", resp.status),
            ActionErrorCode::WebhookRejected.as_str(),
            elapsed_ms(start),
            executed_at,
        )),
        Err(e) => Ok(ActionResult::from_error(&e, elapsed_ms(start), executed_at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signing_matches_known_vector() {
        let payload = br#"{"event":"x"}"#;
        let signed = sign(payload, "s");
        assert!(signed.starts_with("sha256="));
        assert!(verify_signature(payload, &signed, "s"));
    }

    #[test]
    fn verify_tolerates_missing_prefix() {
        let payload = b"hello";
        let signed = sign(payload, "secret");
        let bare = signed.trim_start_matches("sha256=");
        assert!(verify_signature(payload, bare, "secret"));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let payload = b"hello";
        let signed = sign(payload, "secret");
        assert!(!verify_signature(payload, &signed, "other"));
    }

    #[test]
    fn verify_rejects_mutated_payload() {
        let payload = b"hello";
        let signed = sign(payload, "secret");
        assert!(!verify_signature(b"hellO", &signed, "secret"));
    }

    #[test]
    fn validate_requires_header_and_secret_together() {
        let mut cfg = sample_config();
        cfg.signature_header = Some("X-Signature-256".into());
        cfg.signature_secret = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn payload_falls_back_to_params_event_then_params() {
        let cfg = sample_config();
        let with_event = json!({"event": {"k": "v"}, "other": 1});
        assert_eq!(build_payload(&cfg, &with_event), json!({"k": "v"}));

        let without_event = json!({"other": 1});
        assert_eq!(build_payload(&cfg, &without_event), json!({"other": 1}));
    }

    fn sample_config() -> WebhookActionConfig {
        WebhookActionConfig {
            url: "https://hooks.example.com/in".into(),
            method: "POST".into(),
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            payload: None,
            payload_template: None,
            timeout_secs: Some(5),
            success_codes: None,
            signature_header: None,
            signature_secret: None,
            include_timestamp: false,
        }
    }
}
