//! Action runtime: HTTP and webhook action contracts, shared templating,
//! and the result envelope actions return to the workflow executor.

pub mod http_action;
pub mod templating;
pub mod webhook_action;

pub use http_action::HttpActionConfig;
pub use webhook_action::{verify_signature, WebhookActionConfig};

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// The closed error-code enum an action result's `error_code` is drawn
/// from (spec §4.6): `INVALID_CONFIG | PAYLOAD_BUILD_FAILED |
/// PAYLOAD_SERIALIZE_FAILED | DELIVERY_FAILED | WEBHOOK_REJECTED |
/// VALIDATION_ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionErrorCode {
    InvalidConfig,
    PayloadBuildFailed,
    PayloadSerializeFailed,
    DeliveryFailed,
    WebhookRejected,
    ValidationError,
}

impl ActionErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionErrorCode::InvalidConfig => "INVALID_CONFIG",
            ActionErrorCode::PayloadBuildFailed => "PAYLOAD_BUILD_FAILED",
            ActionErrorCode::PayloadSerializeFailed => "PAYLOAD_SERIALIZE_FAILED",
            ActionErrorCode::DeliveryFailed => "DELIVERY_FAILED",
            ActionErrorCode::WebhookRejected => "WEBHOOK_REJECTED",
            ActionErrorCode::ValidationError => "VALIDATION_ERROR",
        }
    }
}

impl std::fmt::Display for ActionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-visible action result (spec §4.6): on success `{success:true,
/// status_code, duration_ms, executed_at, data}`; on failure
/// `{success:false, error, error_code, duration_ms, executed_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub executed_at: DateTime<Utc>,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl ActionResult {
    pub fn success(data: Value, status_code: u16, duration_ms: u64, executed_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            duration_ms,
            executed_at,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn failure(
        message: impl Into<String>,
        error_code: impl Into<String>,
        duration_ms: u64,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            success: false,
            status_code: None,
            duration_ms,
            executed_at,
            data: None,
            error: Some(message.into()),
            error_code: Some(error_code.into()),
        }
    }

    /// Maps a `CoreError` surfaced from the retry/transport layer onto
    /// the closed action error-code enum.
    pub fn from_error(err: &CoreError, duration_ms: u64, executed_at: DateTime<Utc>) -> Self {
        let error_code = match err {
            CoreError::Validation { .. } => ActionErrorCode::ValidationError,
            _ => ActionErrorCode::DeliveryFailed,
        };
        Self::failure(err.to_string(), error_code.as_str(), duration_ms, executed_at)
    }
}

/// Milliseconds elapsed since `start`, for the `duration_ms` envelope field.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
