// Persistence contract the Scheduler consumes (spec §6). No concrete
// storage engine ships here — persistence layout is explicitly out of
// scope — but the trait fixes the exact operations and an in-memory fake
// backs the scheduler's own test suite (mirrors how the credential store
// trait is specified without an implementation in `credentials::store`).

use super::{ExecutionLog, LogStatus, Schedule};
use crate::error::{CoreError, CoreResult};
use crate::ids::{ExecutionId, LogId, ScheduleId, TenantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: Schedule) -> CoreResult<Schedule>;
    async fn get_by_id(&self, tenant_id: &TenantId, id: &ScheduleId) -> CoreResult<Option<Schedule>>;
    async fn get_by_id_no_tenant(&self, id: &ScheduleId) -> CoreResult<Option<Schedule>>;
    async fn update(&self, schedule: Schedule) -> CoreResult<()>;
    async fn delete(&self, tenant_id: &TenantId, id: &ScheduleId) -> CoreResult<()>;
    async fn list(&self, tenant_id: &TenantId) -> CoreResult<Vec<Schedule>>;
    async fn list_all(&self) -> CoreResult<Vec<Schedule>>;

    /// Due set: `enabled AND (next_run_at IS NULL OR next_run_at <= now)`,
    /// ordered by `next_run_at` with nulls first, capped at `limit`.
    async fn get_due(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<Schedule>>;
    async fn update_next_run(&self, id: &ScheduleId, next_run_at: Option<DateTime<Utc>>) -> CoreResult<()>;
    /// `execution_id` may be `None` — some dispatch-failure callers pass
    /// an empty id and it must be accepted and persisted as null (spec §9).
    async fn update_last_run(&self, id: &ScheduleId, last_run_at: DateTime<Utc>, execution_id: Option<ExecutionId>) -> CoreResult<()>;

    async fn has_running_execution(&self, id: &ScheduleId) -> CoreResult<Option<ExecutionId>>;
    async fn set_running_execution(&self, id: &ScheduleId, execution_id: ExecutionId) -> CoreResult<()>;
    async fn clear_running_execution(&self, id: &ScheduleId) -> CoreResult<()>;

    async fn create_log(&self, log: ExecutionLog) -> CoreResult<ExecutionLog>;
    async fn update_log_started(&self, id: &LogId, started_at: DateTime<Utc>, execution_id: Option<ExecutionId>) -> CoreResult<()>;
    async fn update_log_completed(&self, id: &LogId, completed_at: DateTime<Utc>) -> CoreResult<()>;
    async fn update_log_failed(&self, id: &LogId, completed_at: DateTime<Utc>, error_message: String) -> CoreResult<()>;
    async fn update_log_skipped(&self, id: &LogId, reason: String) -> CoreResult<()>;
    async fn update_log_terminated(&self, id: &LogId, completed_at: DateTime<Utc>) -> CoreResult<()>;
    async fn list_logs(&self, tenant_id: &TenantId, schedule_id: &ScheduleId) -> CoreResult<Vec<ExecutionLog>>;
}

/// In-memory repository fake used by the scheduler's own tests (spec §8
/// end-to-end overlap scenarios use exactly this kind of double, not a
/// real database).
#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: Mutex<HashMap<ScheduleId, Schedule>>,
    logs: Mutex<HashMap<LogId, ExecutionLog>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: impl std::fmt::Display) -> CoreError {
    CoreError::validation("id", format!("no record for '{id}'"))
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn create(&self, schedule: Schedule) -> CoreResult<Schedule> {
        let mut schedules = self.schedules.lock().unwrap();
        schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_by_id(&self, tenant_id: &TenantId, id: &ScheduleId) -> CoreResult<Option<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.get(id).filter(|s| &s.tenant_id == tenant_id).cloned())
    }

    async fn get_by_id_no_tenant(&self, id: &ScheduleId) -> CoreResult<Option<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.get(id).cloned())
    }

    async fn update(&self, schedule: Schedule) -> CoreResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId, id: &ScheduleId) -> CoreResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        if let Some(existing) = schedules.get(id) {
            if &existing.tenant_id == tenant_id {
                schedules.remove(id);
            }
        }
        Ok(())
    }

    async fn list(&self, tenant_id: &TenantId) -> CoreResult<Vec<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.values().filter(|s| &s.tenant_id == tenant_id).cloned().collect())
    }

    async fn list_all(&self) -> CoreResult<Vec<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.values().cloned().collect())
    }

    async fn get_due(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        let mut due: Vec<Schedule> = schedules
            .values()
            .filter(|s| s.enabled && s.next_run_at.map(|t| t <= now).unwrap_or(true))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at.unwrap_or(DateTime::<Utc>::MIN_UTC));
        due.truncate(limit);
        Ok(due)
    }

    async fn update_next_run(&self, id: &ScheduleId, next_run_at: Option<DateTime<Utc>>) -> CoreResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules.get_mut(id).ok_or_else(|| not_found(id))?;
        schedule.next_run_at = next_run_at;
        Ok(())
    }

    async fn update_last_run(&self, id: &ScheduleId, last_run_at: DateTime<Utc>, execution_id: Option<ExecutionId>) -> CoreResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules.get_mut(id).ok_or_else(|| not_found(id))?;
        schedule.last_run_at = Some(last_run_at);
        schedule.last_execution_id = execution_id;
        Ok(())
    }

    async fn has_running_execution(&self, id: &ScheduleId) -> CoreResult<Option<ExecutionId>> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.get(id).and_then(|s| s.running_execution_id))
    }

    async fn set_running_execution(&self, id: &ScheduleId, execution_id: ExecutionId) -> CoreResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules.get_mut(id).ok_or_else(|| not_found(id))?;
        schedule.running_execution_id = Some(execution_id);
        Ok(())
    }

    async fn clear_running_execution(&self, id: &ScheduleId) -> CoreResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules.get_mut(id).ok_or_else(|| not_found(id))?;
        schedule.running_execution_id = None;
        Ok(())
    }

    async fn create_log(&self, log: ExecutionLog) -> CoreResult<ExecutionLog> {
        let mut logs = self.logs.lock().unwrap();
        logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn update_log_started(&self, id: &LogId, started_at: DateTime<Utc>, execution_id: Option<ExecutionId>) -> CoreResult<()> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.get_mut(id).ok_or_else(|| not_found(id))?;
        log.started_at = Some(started_at);
        log.execution_id = execution_id;
        log.status = LogStatus::Running;
        Ok(())
    }

    async fn update_log_completed(&self, id: &LogId, completed_at: DateTime<Utc>) -> CoreResult<()> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.get_mut(id).ok_or_else(|| not_found(id))?;
        if log.status.is_terminal() {
            return Ok(());
        }
        log.completed_at = Some(completed_at);
        log.status = LogStatus::Completed;
        Ok(())
    }

    async fn update_log_failed(&self, id: &LogId, completed_at: DateTime<Utc>, error_message: String) -> CoreResult<()> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.get_mut(id).ok_or_else(|| not_found(id))?;
        if log.status.is_terminal() {
            return Ok(());
        }
        log.completed_at = Some(completed_at);
        log.status = LogStatus::Failed;
        log.error_message = Some(error_message);
        Ok(())
    }

    async fn update_log_terminated(&self, id: &LogId, completed_at: DateTime<Utc>) -> CoreResult<()> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.get_mut(id).ok_or_else(|| not_found(id))?;
        if log.status.is_terminal() {
            return Ok(());
        }
        log.completed_at = Some(completed_at);
        log.status = LogStatus::Terminated;
        Ok(())
    }

    async fn list_logs(&self, tenant_id: &TenantId, schedule_id: &ScheduleId) -> CoreResult<Vec<ExecutionLog>> {
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .values()
            .filter(|l| &l.tenant_id == tenant_id && &l.schedule_id == schedule_id)
            .cloned()
            .collect())
    }
}
