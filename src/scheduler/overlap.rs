// Overlap-policy handler (spec §4.9, §9 Open Question resolutions):
// decides what the tick loop does when a schedule fires while its prior
// execution is still running, and receives the completion callbacks the
// workflow runtime invokes once that execution finishes.
//
// `queue` behaves like `skip` but for a different reason string, and —
// per spec §9's explicit resolution of the ambiguity — does NOT advance
// `next_run_at` either; the tick loop naturally retries both.

use super::executor::WorkflowExecutor;
use super::repository::ScheduleRepository;
use super::{OverlapPolicy, Schedule};
use crate::error::CoreResult;
use crate::ids::{ExecutionId, LogId, ScheduleId};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// What the tick loop should do with a due schedule.
#[derive(Debug)]
pub enum OverlapDecision {
    /// No prior execution is running (or none is tracked): dispatch.
    Proceed,
    /// A prior execution is running and the policy says not to start a
    /// new one this tick.
    Skip { reason: String },
    /// A prior execution was running and has just been asked to
    /// terminate; the caller should proceed to dispatch a new one.
    Terminated { previous: ExecutionId },
}

/// Maps a live `ExecutionId` back to the `ExecutionLog`/schedule it
/// belongs to, so the out-of-band completion callbacks below — which
/// only carry an execution id — can find the record to transition. This
/// bookkeeping is an implementation detail of this in-process scheduler;
/// it is not part of the persistence contract (spec §6), which is
/// addressed purely in terms of schedule/log ids.
pub struct OverlapHandler {
    repo: Arc<dyn ScheduleRepository>,
    executor: Arc<dyn WorkflowExecutor>,
    in_flight: Mutex<HashMap<ExecutionId, (ScheduleId, LogId)>>,
}

impl OverlapHandler {
    pub fn new(repo: Arc<dyn ScheduleRepository>, executor: Arc<dyn WorkflowExecutor>) -> Self {
        Self {
            repo,
            executor,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the overlap policy against `schedule`'s live
    /// `running_execution_id` (spec §4.9 step 2b).
    pub async fn resolve(&self, schedule: &Schedule) -> CoreResult<OverlapDecision> {
        let running = self.repo.has_running_execution(&schedule.id).await?;
        let Some(running_id) = running else {
            return Ok(OverlapDecision::Proceed);
        };

        match schedule.overlap_policy {
            OverlapPolicy::Skip => Ok(OverlapDecision::Skip {
                reason: format!("previous execution {running_id} still running (policy: skip)"),
            }),
            OverlapPolicy::Queue => Ok(OverlapDecision::Skip {
                reason: format!("previous execution {running_id} still running (policy: queue, will retry)"),
            }),
            OverlapPolicy::Terminate => {
                if let Err(e) = self.executor.cancel_execution(&schedule.tenant_id, &running_id).await {
                    warn!(
                        schedule_id = %schedule.id,
                        execution_id = %running_id,
                        error = %e,
                        "best-effort cancel of running execution failed"
                    );
                }
                if let Some((_, log_id)) = self.in_flight.lock().remove(&running_id) {
                    self.repo.update_log_terminated(&log_id, Utc::now()).await?;
                }
                self.repo.clear_running_execution(&schedule.id).await?;
                Ok(OverlapDecision::Terminated { previous: running_id })
            }
        }
    }

    /// Registers a newly dispatched execution so a later completion
    /// callback can find its log and schedule.
    pub fn track(&self, schedule_id: ScheduleId, execution_id: ExecutionId, log_id: LogId) {
        self.in_flight.lock().insert(execution_id, (schedule_id, log_id));
    }

    /// Invoked by the workflow runtime when a scheduled execution
    /// completes successfully. Transitions the log to `completed` and
    /// clears `running_execution_id`.
    pub async fn record_completed(&self, execution_id: &ExecutionId) -> CoreResult<()> {
        let Some((schedule_id, log_id)) = self.in_flight.lock().remove(execution_id) else {
            return Ok(());
        };
        self.repo.update_log_completed(&log_id, Utc::now()).await?;
        self.repo.clear_running_execution(&schedule_id).await
    }

    /// Invoked when a scheduled execution fails. Transitions the log to
    /// `failed` with `error_message` and clears `running_execution_id`.
    pub async fn record_failed(&self, execution_id: &ExecutionId, error_message: String) -> CoreResult<()> {
        let Some((schedule_id, log_id)) = self.in_flight.lock().remove(execution_id) else {
            return Ok(());
        };
        self.repo.update_log_failed(&log_id, Utc::now(), error_message).await?;
        self.repo.clear_running_execution(&schedule_id).await
    }

    /// Invoked when an execution is terminated out of band (not via the
    /// `Terminate` overlap policy path above, e.g. an operator-initiated
    /// cancel). Transitions the log to `terminated` and clears
    /// `running_execution_id`.
    pub async fn record_terminated(&self, execution_id: &ExecutionId) -> CoreResult<()> {
        let Some((schedule_id, log_id)) = self.in_flight.lock().remove(execution_id) else {
            return Ok(());
        };
        self.repo.update_log_terminated(&log_id, Utc::now()).await?;
        self.repo.clear_running_execution(&schedule_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TenantId;
    use crate::scheduler::repository::InMemoryScheduleRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExecutor {
        cancels: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowExecutor for FakeExecutor {
        async fn execute_scheduled(&self, _: &TenantId, _: &str, _: &ScheduleId) -> CoreResult<ExecutionId> {
            Ok(ExecutionId::new())
        }

        async fn cancel_execution(&self, _: &TenantId, _: &ExecutionId) -> CoreResult<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn make_schedule(repo: &InMemoryScheduleRepository, policy: OverlapPolicy) -> Schedule {
        let schedule = Schedule::new(
            TenantId::from("tenant-a"),
            "wf-1",
            "nightly",
            "0 0 * * *",
            None,
            policy,
            true,
        )
        .unwrap();
        repo.create(schedule).await.unwrap()
    }

    #[tokio::test]
    async fn skip_policy_produces_skip_with_reason() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = make_schedule(&repo, OverlapPolicy::Skip).await;
        let running_id = ExecutionId::new();
        repo.set_running_execution(&schedule.id, running_id).await.unwrap();

        let executor = Arc::new(FakeExecutor { cancels: AtomicUsize::new(0) });
        let handler = OverlapHandler::new(repo.clone(), executor);
        let decision = handler.resolve(&schedule).await.unwrap();
        match decision {
            OverlapDecision::Skip { reason } => assert!(reason.contains("skip")),
            _ => panic!("expected Skip"),
        }
    }

    #[tokio::test]
    async fn queue_policy_does_not_advance_and_also_skips() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = make_schedule(&repo, OverlapPolicy::Queue).await;
        repo.set_running_execution(&schedule.id, ExecutionId::new()).await.unwrap();

        let executor = Arc::new(FakeExecutor { cancels: AtomicUsize::new(0) });
        let handler = OverlapHandler::new(repo.clone(), executor);
        let decision = handler.resolve(&schedule).await.unwrap();
        match decision {
            OverlapDecision::Skip { reason } => assert!(reason.contains("queue")),
            _ => panic!("expected Skip"),
        }
    }

    #[tokio::test]
    async fn terminate_policy_cancels_and_clears_running_execution() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = make_schedule(&repo, OverlapPolicy::Terminate).await;
        let running_id = ExecutionId::new();
        repo.set_running_execution(&schedule.id, running_id).await.unwrap();

        let executor = Arc::new(FakeExecutor { cancels: AtomicUsize::new(0) });
        let handler = OverlapHandler::new(repo.clone(), executor.clone());
        let decision = handler.resolve(&schedule).await.unwrap();
        assert!(matches!(decision, OverlapDecision::Terminated { previous } if previous == running_id));
        assert_eq!(executor.cancels.load(Ordering::SeqCst), 1);
        assert!(repo.has_running_execution(&schedule.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_running_execution_proceeds() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = make_schedule(&repo, OverlapPolicy::Skip).await;
        let executor = Arc::new(FakeExecutor { cancels: AtomicUsize::new(0) });
        let handler = OverlapHandler::new(repo, executor);
        assert!(matches!(handler.resolve(&schedule).await.unwrap(), OverlapDecision::Proceed));
    }

    #[tokio::test]
    async fn record_completed_clears_running_execution() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = make_schedule(&repo, OverlapPolicy::Skip).await;
        let execution_id = ExecutionId::new();
        repo.set_running_execution(&schedule.id, execution_id).await.unwrap();
        let log = repo
            .create_log(crate::scheduler::ExecutionLog::pending(schedule.tenant_id.clone(), schedule.id, Utc::now()))
            .await
            .unwrap();

        let executor = Arc::new(FakeExecutor { cancels: AtomicUsize::new(0) });
        let handler = OverlapHandler::new(repo.clone(), executor);
        handler.track(schedule.id, execution_id, log.id);
        handler.record_completed(&execution_id).await.unwrap();

        assert!(repo.has_running_execution(&schedule.id).await.unwrap().is_none());
    }
}
