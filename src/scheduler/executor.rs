// Workflow Executor contract (spec §6): the Scheduler's only collaborator
// for actually running a workflow. The DAG interpreter itself is
// explicitly out of scope — this trait fixes only the boundary the
// scheduler dispatches across.

use crate::error::CoreResult;
use crate::ids::{ExecutionId, ScheduleId, TenantId};
use async_trait::async_trait;

/// Starts a scheduled workflow run and returns the new execution's id.
///
/// Implementations own the DAG walk, node dispatch, and persistence of
/// the resulting execution record; the scheduler only needs an id back
/// to correlate its own `ExecutionLog` and `running_execution_id` state.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn execute_scheduled(
        &self,
        tenant_id: &TenantId,
        workflow_id: &str,
        schedule_id: &ScheduleId,
    ) -> CoreResult<ExecutionId>;

    /// Best-effort cancellation of an in-flight execution, used by the
    /// `terminate` overlap policy. Implementations that cannot cancel
    /// promptly should still return `Ok(())` — the scheduler treats this
    /// as fire-and-forget and proceeds to dispatch the new run regardless.
    async fn cancel_execution(&self, tenant_id: &TenantId, execution_id: &ExecutionId) -> CoreResult<()>;
}
