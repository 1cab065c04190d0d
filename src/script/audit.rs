// Tracer / audit logger (spec §4.7 "every execution is audited"). Each
// run produces one record regardless of outcome; the script body itself
// is never stored, only a truncated hash of it, so the audit trail can't
// become a second copy of potentially sensitive script source.

use crate::ids::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// First 8 bytes of the script source's SHA-256 digest, hex-encoded.
/// Enough to correlate repeated executions of the same script without
/// retaining the source itself.
pub fn script_hash(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub execution_id: ExecutionId,
    pub tenant_id: String,
    pub workflow_id: String,
    pub node_id: String,
    pub user_id: Option<String>,
    pub script_hash: String,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Minimal audit sink. The default implementation emits a structured
/// `tracing` event; a durable deployment would swap this for one backed
/// by the same store as [`crate::scheduler::repository::ScheduleRepository`].
pub trait AuditLogger: Send + Sync {
    fn record(&self, record: AuditRecord);
}

#[derive(Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn record(&self, record: AuditRecord) {
        if record.success {
            tracing::info!(
                execution_id = %record.execution_id,
                tenant_id = %record.tenant_id,
                workflow_id = %record.workflow_id,
                node_id = %record.node_id,
                script_hash = %record.script_hash,
                duration_ms = record.duration.as_millis() as u64,
                "script execution audit"
            );
        } else {
            tracing::warn!(
                execution_id = %record.execution_id,
                tenant_id = %record.tenant_id,
                workflow_id = %record.workflow_id,
                node_id = %record.node_id,
                script_hash = %record.script_hash,
                duration_ms = record.duration.as_millis() as u64,
                error = record.error.as_deref().unwrap_or(""),
                "script execution audit (failed)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_truncated() {
        let a = script_hash("return 1 + 1;");
        let b = script_hash("return 1 + 1;");
        let c = script_hash("return 2 + 2;");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16); // 8 bytes, hex-encoded
    }

    #[test]
    fn tracing_logger_accepts_both_outcomes() {
        let logger = TracingAuditLogger;
        logger.record(AuditRecord {
            execution_id: ExecutionId::new(),
            tenant_id: "t1".into(),
            workflow_id: "wf1".into(),
            node_id: "n1".into(),
            user_id: None,
            script_hash: script_hash("return 1;"),
            success: true,
            duration: Duration::from_millis(5),
            error: None,
            recorded_at: Utc::now(),
        });
        logger.record(AuditRecord {
            execution_id: ExecutionId::new(),
            tenant_id: "t1".into(),
            workflow_id: "wf1".into(),
            node_id: "n1".into(),
            user_id: None,
            script_hash: script_hash("throw new Error('x');"),
            success: false,
            duration: Duration::from_millis(5),
            error: Some("boom".into()),
            recorded_at: Utc::now(),
        });
    }
}
