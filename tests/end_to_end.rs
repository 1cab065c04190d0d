// End-to-end scenarios that cross module boundaries, exercised through
// the crate's public API rather than internal `#[cfg(test)]` modules.

use cadence_core::auth::{self, Authenticator};
use cadence_core::credentials::{Credential, CredentialId, CredentialType, SecretKey};
use cadence_core::error::CoreError;
use cadence_core::request::{Method, Request};
use cadence_core::scheduler::repository::InMemoryScheduleRepository;
use cadence_core::scheduler::{OverlapHandler, OverlapPolicy, Schedule, Scheduler, SchedulerConfig, WorkflowExecutor};
use cadence_core::script::{ExecutionContext, ScriptEngine, ScriptEngineConfig};
use cadence_core::{CoreResult, ExecutionId, ScheduleId, TenantId};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct CountingExecutor {
    calls: AtomicUsize,
}

#[async_trait]
impl WorkflowExecutor for CountingExecutor {
    async fn execute_scheduled(&self, _tenant_id: &TenantId, _workflow_id: &str, _schedule_id: &ScheduleId) -> CoreResult<ExecutionId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionId::new())
    }

    async fn cancel_execution(&self, _tenant_id: &TenantId, _execution_id: &ExecutionId) -> CoreResult<()> {
        Ok(())
    }
}

/// A credential sealed for storage, unsealed at call time, and used to
/// build an authenticator that signs an outbound request: the path a
/// real integration call takes from the credential store through to the
/// wire (spec §4.5/§4.6/§6).
#[tokio::test]
async fn sealed_credential_round_trips_through_an_authenticator() {
    let master_key = SecretKey::from_bytes([9u8; 32]);

    let mut data = BTreeMap::new();
    data.insert("token".to_string(), "sk-live-abc123".to_string());
    let live = Credential::live(CredentialId("cred-1".into()), CredentialType::BearerToken, data);

    let sealed = live.seal(&master_key).unwrap();
    assert!(sealed.is_persistable());

    let unsealed = sealed.unseal(&master_key).unwrap();
    let token = unsealed.data.as_ref().unwrap().get("token").unwrap().clone();

    let authenticator = auth::bearer(token, None);
    let mut request = Request::new(Method::Get, "https://example.com/api/resource");
    authenticator.authenticate(&mut request).await.unwrap();

    assert_eq!(request.headers.get("Authorization").unwrap(), "Bearer sk-live-abc123");
}

#[tokio::test]
async fn scheduler_dispatches_through_the_public_api() {
    let repo = Arc::new(InMemoryScheduleRepository::new());
    let mut schedule = Schedule::new(
        TenantId::from("tenant-a"),
        "wf-1",
        "nightly",
        "0 0 * * *",
        None,
        OverlapPolicy::Skip,
        true,
    )
    .unwrap();
    schedule.next_run_at = Some(Utc::now() - chrono::Duration::seconds(1));
    let schedule = repo.create(schedule).await.unwrap();

    let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
    let scheduler = Scheduler::new(repo.clone(), executor.clone(), SchedulerConfig::default());

    scheduler.tick().await;

    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    let _ = OverlapHandler::new(repo, executor);
    let _ = schedule;
}

#[tokio::test]
async fn script_timeout_reports_within_budget_and_is_audited() {
    let mut config = ScriptEngineConfig::default();
    config.default_timeout = Duration::from_millis(200);
    let engine = ScriptEngine::new(config).unwrap();
    let cancel = CancellationToken::new();

    let context = ExecutionContext {
        execution_id: ExecutionId::new(),
        tenant_id: "tenant-a".into(),
        workflow_id: "wf-1".into(),
        node_id: "node-1".into(),
        user_id: None,
    };

    let start = std::time::Instant::now();
    let err = engine
        .execute("while (true) {}", context, serde_json::json!({}), None, &cancel)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, CoreError::ScriptTimeout { .. }));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed <= Duration::from_millis(600));
}
