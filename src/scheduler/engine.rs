// The tick loop itself (spec §4.9). Single active instance: ticks on a
// fixed interval, loads the due set, and fans dispatches out bounded by
// a concurrency limit, awaiting all of them before the next tick.

use super::overlap::{OverlapDecision, OverlapHandler};
use super::repository::ScheduleRepository;
use super::{executor::WorkflowExecutor, ExecutionLog, Schedule};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub check_interval: Duration,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            batch_size: 100,
            concurrency: 10,
        }
    }
}

/// The durable cron scheduler (spec §4.9). Owns nothing persistent
/// itself — all `Schedule`/`ExecutionLog` mutation goes through the
/// repository trait — but is the single process that drives tick timing
/// and overlap-policy enforcement.
pub struct Scheduler {
    repo: Arc<dyn ScheduleRepository>,
    overlap: Arc<OverlapHandler>,
    executor: Arc<dyn WorkflowExecutor>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(repo: Arc<dyn ScheduleRepository>, executor: Arc<dyn WorkflowExecutor>, config: SchedulerConfig) -> Self {
        let overlap = Arc::new(OverlapHandler::new(repo.clone(), executor.clone()));
        Self {
            repo,
            overlap,
            executor,
            config,
        }
    }

    /// The overlap handler, shared with the workflow runtime so its
    /// execution-completion callbacks (`record_completed` et al.) can
    /// reach the same in-flight bookkeeping this scheduler populates.
    pub fn overlap_handler(&self) -> Arc<OverlapHandler> {
        self.overlap.clone()
    }

    /// Runs the tick loop until `cancel` fires. Graceful shutdown: the
    /// ticker stops immediately, but a tick already in progress (and its
    /// dispatch fan-out) is allowed to finish — spec §4.9/§5 "signal →
    /// ticker stops → inflight dispatches complete → return".
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.config.check_interval, "scheduler tick loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = cancel.cancelled() => {
                    info!("scheduler received stop signal, exiting after inflight work");
                    break;
                }
            }
        }
    }

    /// One tick: load the due set, dispatch each with bounded
    /// concurrency, and await all before returning (spec §4.9 steps 1-3).
    pub async fn tick(&self) {
        let now = Utc::now();
        let due = match self.repo.get_due(now, self.config.batch_size).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to load due schedules");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        let concurrency = self.config.concurrency.max(1);
        stream::iter(due)
            .map(|schedule| self.dispatch_one(schedule))
            .buffer_unordered(concurrency)
            .collect::<Vec<()>>()
            .await;
    }

    /// Dispatches a single due schedule (spec §4.9 step 2).
    async fn dispatch_one(&self, schedule: Schedule) {
        // Re-check enabled: it may have been disabled between the due
        // query and this dispatch.
        let current = match self.repo.get_by_id_no_tenant(&schedule.id).await {
            Ok(Some(s)) if s.enabled => s,
            Ok(Some(_)) => return,
            Ok(None) => return,
            Err(e) => {
                error!(schedule_id = %schedule.id, error = %e, "failed to re-read schedule before dispatch");
                return;
            }
        };

        let decision = match self.overlap.resolve(&current).await {
            Ok(d) => d,
            Err(e) => {
                error!(schedule_id = %current.id, error = %e, "overlap resolution failed");
                return;
            }
        };

        match decision {
            OverlapDecision::Skip { reason } => {
                warn!(schedule_id = %current.id, %reason, "tick skipped due to overlap policy");
                let log = ExecutionLog::skipped(current.tenant_id.clone(), current.id, Utc::now(), reason);
                if let Err(e) = self.repo.create_log(log).await {
                    error!(schedule_id = %current.id, error = %e, "failed to record skipped execution log");
                }
                // next_run_at is deliberately left unchanged (spec §9):
                // the next eligible tick recomputes/retries.
            }
            OverlapDecision::Proceed | OverlapDecision::Terminated { .. } => {
                self.execute(&current).await;
            }
        }
    }

    /// Creates the pending log, asks the executor to start the workflow,
    /// and advances the schedule's run bookkeeping (spec §4.9 step 2c/2d).
    async fn execute(&self, schedule: &Schedule) {
        let now = Utc::now();
        let log = ExecutionLog::pending(schedule.tenant_id.clone(), schedule.id, now);
        let log = match self.repo.create_log(log).await {
            Ok(l) => l,
            Err(e) => {
                error!(schedule_id = %schedule.id, error = %e, "failed to create execution log");
                return;
            }
        };

        let dispatch = self
            .executor
            .execute_scheduled(&schedule.tenant_id, &schedule.workflow_id, &schedule.id)
            .await;

        let execution_id = match dispatch {
            Ok(execution_id) => {
                if let Err(e) = self.repo.update_log_started(&log.id, Utc::now(), Some(execution_id)).await {
                    error!(schedule_id = %schedule.id, error = %e, "failed to mark log started");
                }
                if let Err(e) = self.repo.set_running_execution(&schedule.id, execution_id).await {
                    error!(schedule_id = %schedule.id, error = %e, "failed to set running_execution_id");
                }
                self.overlap.track(schedule.id, execution_id, log.id);
                Some(execution_id)
            }
            Err(e) => {
                error!(schedule_id = %schedule.id, error = %e, "workflow executor failed to start scheduled run");
                if let Err(e) = self.repo.update_log_failed(&log.id, Utc::now(), e.to_string()).await {
                    error!(schedule_id = %schedule.id, error = %e, "failed to mark log failed");
                }
                // Still advance last_run_at/next_run_at on failure to
                // avoid a hot-spin tick loop (spec §4.9 step 2d, §9).
                None
            }
        };

        if let Err(e) = self.repo.update_last_run(&schedule.id, now, execution_id).await {
            error!(schedule_id = %schedule.id, error = %e, "failed to update last_run_at");
        }
        let next = schedule.compute_next_run(now);
        if let Err(e) = self.repo.update_next_run(&schedule.id, next).await {
            error!(schedule_id = %schedule.id, error = %e, "failed to advance next_run_at");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ExecutionId, ScheduleId, TenantId};
    use crate::scheduler::repository::InMemoryScheduleRepository;
    use crate::scheduler::{LogStatus, OverlapPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeExecutor {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeExecutor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl WorkflowExecutor for FakeExecutor {
        async fn execute_scheduled(&self, _: &TenantId, _: &str, _: &ScheduleId) -> crate::error::CoreResult<ExecutionId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(crate::error::CoreError::Internal("boom".into()));
            }
            Ok(ExecutionId::new())
        }

        async fn cancel_execution(&self, _: &TenantId, _: &ExecutionId) -> crate::error::CoreResult<()> {
            Ok(())
        }
    }

    async fn due_schedule(repo: &InMemoryScheduleRepository, policy: OverlapPolicy) -> Schedule {
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
        let mut schedule = repo.create(schedule).await.unwrap();
        schedule.next_run_at = Some(Utc::now() - chrono::Duration::seconds(1));
        repo.update(schedule.clone()).await.unwrap();
        schedule
    }

    #[tokio::test]
    async fn tick_dispatches_due_schedule_and_advances_next_run() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = due_schedule(&repo, OverlapPolicy::Skip).await;
        let executor = Arc::new(FakeExecutor::new());
        let scheduler = Scheduler::new(repo.clone(), executor.clone(), SchedulerConfig::default());

        scheduler.tick().await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        let updated = repo.get_by_id_no_tenant(&schedule.id).await.unwrap().unwrap();
        assert!(updated.last_run_at.is_some());
        assert!(updated.running_execution_id.is_some());
    }

    #[tokio::test]
    async fn skip_policy_prevents_executor_call_and_keeps_next_run_at() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = due_schedule(&repo, OverlapPolicy::Skip).await;
        repo.set_running_execution(&schedule.id, ExecutionId::new()).await.unwrap();
        let before = repo.get_by_id_no_tenant(&schedule.id).await.unwrap().unwrap().next_run_at;

        let executor = Arc::new(FakeExecutor::new());
        let scheduler = Scheduler::new(repo.clone(), executor.clone(), SchedulerConfig::default());
        scheduler.tick().await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        let after = repo.get_by_id_no_tenant(&schedule.id).await.unwrap().unwrap().next_run_at;
        assert_eq!(before, after);

        let logs = repo.list_logs(&schedule.tenant_id, &schedule.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Skipped);
    }

    #[tokio::test]
    async fn dispatch_failure_still_advances_next_run_at() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = due_schedule(&repo, OverlapPolicy::Skip).await;
        let executor = Arc::new(FakeExecutor::new());
        executor.fail.store(true, Ordering::SeqCst);
        let scheduler = Scheduler::new(repo.clone(), executor.clone(), SchedulerConfig::default());

        scheduler.tick().await;

        let updated = repo.get_by_id_no_tenant(&schedule.id).await.unwrap().unwrap();
        assert!(updated.last_run_at.is_some());
        assert!(updated.last_execution_id.is_none());
        assert!(updated.next_run_at.unwrap() > Utc::now());

        let logs = repo.list_logs(&schedule.tenant_id, &schedule.id).await.unwrap();
        assert_eq!(logs[0].status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn disabled_schedule_is_skipped_silently() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let schedule = due_schedule(&repo, OverlapPolicy::Skip).await;
        let mut disabled = schedule.clone();
        disabled.enabled = false;
        repo.update(disabled).await.unwrap();

        let executor = Arc::new(FakeExecutor::new());
        let scheduler = Scheduler::new(repo.clone(), executor.clone(), SchedulerConfig::default());
        scheduler.tick().await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_exits_promptly_on_cancellation() {
        let repo = Arc::new(InMemoryScheduleRepository::new());
        let executor = Arc::new(FakeExecutor::new());
        let scheduler = Scheduler::new(
            repo,
            executor,
            SchedulerConfig {
                check_interval: Duration::from_secs(3600),
                ..SchedulerConfig::default()
            },
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), scheduler.run(cancel))
            .await
            .expect("run should return promptly once cancelled");
    }
}
