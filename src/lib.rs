//! Core runtime for a multi-tenant workflow automation platform: a
//! durable cron scheduler, a resilient action runtime (HTTP client +
//! authenticators + retry/circuit-breaker), a sandboxed script engine,
//! the shared credential subsystem, and the integration registry tying
//! them together.
//!
//! Persistence, the public API surface, the DAG interpreter, and
//! distributed leader election live outside this crate; the contracts
//! they implement against are defined here as traits
//! (`scheduler::ScheduleRepository`, `scheduler::WorkflowExecutor`,
//! `credentials::CredentialStore`).

pub mod actions;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod cron;
pub mod error;
pub mod http_client;
pub mod ids;
pub mod integrations;
pub mod request;
pub mod resilience;
pub mod scheduler;
pub mod script;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use ids::{ExecutionId, LogId, ScheduleId, TenantId};

/// Initializes the process-wide `tracing` subscriber from `RUST_LOG`
/// (defaulting to `info`). Call once at process start; safe to call more
/// than once in tests, where later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
