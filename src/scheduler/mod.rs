//! Durable cron scheduler: the `Schedule`/`ExecutionLog` data model, the
//! repository and workflow-executor contracts it consumes (spec §6), the
//! overlap-policy handler, and the tick loop itself (spec §4.9).

pub mod engine;
pub mod executor;
pub mod overlap;
pub mod repository;

pub use engine::{Scheduler, SchedulerConfig};
pub use executor::WorkflowExecutor;
pub use overlap::OverlapHandler;
pub use repository::ScheduleRepository;

use crate::ids::{ExecutionId, LogId, ScheduleId, TenantId};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a schedule does when a tick fires while a prior execution of the
/// same schedule is still running (spec §3/§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    Skip,
    Queue,
    Terminate,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        OverlapPolicy::Skip
    }
}

/// The scheduling record (spec §3 `Schedule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub tenant_id: TenantId,
    pub id: ScheduleId,
    pub workflow_id: String,
    pub name: String,
    pub cron_expression: String,
    /// IANA timezone name; defaults to `"UTC"`.
    pub timezone: String,
    pub overlap_policy: OverlapPolicy,
    pub enabled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_execution_id: Option<ExecutionId>,
    pub running_execution_id: Option<ExecutionId>,
}

impl Schedule {
    /// Constructs a new schedule, validating that `cron_expression` parses
    /// and `timezone` loads, and computing an initial `next_run_at` when
    /// `enabled` (spec §3 invariants).
    pub fn new(
        tenant_id: TenantId,
        workflow_id: impl Into<String>,
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        timezone: Option<String>,
        overlap_policy: OverlapPolicy,
        enabled: bool,
    ) -> crate::error::CoreResult<Self> {
        let cron_expression = cron_expression.into();
        let timezone = timezone.unwrap_or_else(|| "UTC".to_string());
        let parsed = crate::cron::parse(&cron_expression)
            .map_err(|e| crate::error::CoreError::validation("cron_expression", e.to_string()))?;
        let tz: Tz = Tz::from_str(&timezone)
            .map_err(|_| crate::error::CoreError::validation("timezone", format!("unknown IANA timezone '{timezone}'")))?;

        let mut schedule = Self {
            tenant_id,
            id: ScheduleId::new(),
            workflow_id: workflow_id.into(),
            name: name.into(),
            cron_expression,
            timezone,
            overlap_policy,
            enabled,
            next_run_at: None,
            last_run_at: None,
            last_execution_id: None,
            running_execution_id: None,
        };
        if schedule.enabled {
            let now = Utc::now().with_timezone(&tz);
            schedule.next_run_at = parsed.next_runs(tz, now, 1).first().map(|dt| dt.with_timezone(&Utc));
        }
        Ok(schedule)
    }

    /// Recomputes `next_run_at` from `from` using this schedule's cron
    /// expression and timezone, falling back to UTC if the stored
    /// timezone no longer loads (spec §4.8).
    pub fn compute_next_run(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let parsed = crate::cron::parse(&self.cron_expression).ok()?;
        let tz = Tz::from_str(&self.timezone).unwrap_or(Tz::UTC);
        let local_from = from.with_timezone(&tz);
        parsed.next_runs(tz, local_from, 1).first().map(|dt| dt.with_timezone(&Utc))
    }
}

/// Per-firing status (spec §3 `ExecutionLog`). Terminal statuses
/// (`Completed`, `Failed`, `Skipped`, `Terminated`) never transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Terminated,
}

impl LogStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LogStatus::Completed | LogStatus::Failed | LogStatus::Skipped | LogStatus::Terminated
        )
    }
}

/// Per-firing audit record (spec §3 `ExecutionLog`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: LogId,
    pub tenant_id: TenantId,
    pub schedule_id: ScheduleId,
    pub execution_id: Option<ExecutionId>,
    pub trigger_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub skipped_reason: Option<String>,
}

impl ExecutionLog {
    pub fn pending(tenant_id: TenantId, schedule_id: ScheduleId, trigger_time: DateTime<Utc>) -> Self {
        Self {
            id: LogId::new(),
            tenant_id,
            schedule_id,
            execution_id: None,
            trigger_time,
            started_at: None,
            completed_at: None,
            status: LogStatus::Pending,
            error_message: None,
            skipped_reason: None,
        }
    }

    pub fn skipped(tenant_id: TenantId, schedule_id: ScheduleId, trigger_time: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            id: LogId::new(),
            tenant_id,
            schedule_id,
            execution_id: None,
            trigger_time,
            started_at: None,
            completed_at: Some(trigger_time),
            status: LogStatus::Skipped,
            error_message: None,
            skipped_reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_schedule_computes_next_run_when_enabled() {
        let schedule = Schedule::new(
            TenantId::from("tenant-a"),
            "wf-1",
            "nightly",
            "0 0 * * *",
            None,
            OverlapPolicy::Skip,
            true,
        )
        .unwrap();
        assert!(schedule.next_run_at.is_some());
    }

    #[test]
    fn disabled_schedule_has_no_next_run() {
        let schedule = Schedule::new(
            TenantId::from("tenant-a"),
            "wf-1",
            "nightly",
            "0 0 * * *",
            None,
            OverlapPolicy::Skip,
            false,
        )
        .unwrap();
        assert!(schedule.next_run_at.is_none());
    }

    #[test]
    fn invalid_cron_expression_rejected() {
        let err = Schedule::new(
            TenantId::from("tenant-a"),
            "wf-1",
            "bad",
            "not a cron",
            None,
            OverlapPolicy::Skip,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Validation { .. }));
    }

    #[test]
    fn invalid_timezone_rejected() {
        let err = Schedule::new(
            TenantId::from("tenant-a"),
            "wf-1",
            "bad-tz",
            "0 0 * * *",
            Some("Not/AZone".to_string()),
            OverlapPolicy::Skip,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Validation { .. }));
    }
}
