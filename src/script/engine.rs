// Main script engine entry point (spec §4.7): wires the sandbox, VM
// pool, context injector, console capture, resource monitor, and audit
// logger into the six-step execution protocol.

use super::audit::{self, AuditLogger, TracingAuditLogger};
use super::console::{self, ConsoleCapture, ConsoleEntry};
use super::context::{self, ExecutionContext};
use super::convert;
use super::monitor::{self, MonitorViolation};
use super::pool::VmPool;
use super::sandbox::Sandbox;
use crate::error::{CoreError, CoreResult, InterruptKind, ScriptPhase};
use crate::ids::ExecutionId;
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct ScriptEngineConfig {
    pub pool_size: usize,
    pub max_memory_bytes: usize,
    pub max_script_len: usize,
    pub default_timeout: Duration,
    pub max_timeout: Duration,
}

impl Default for ScriptEngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            max_memory_bytes: 64 * 1024 * 1024,
            max_script_len: 64 * 1024,
            default_timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&crate::config::CoreConfig> for ScriptEngineConfig {
    fn from(config: &crate::config::CoreConfig) -> Self {
        Self {
            pool_size: config.script_pool_size,
            max_memory_bytes: config.script_max_memory_mb * 1024 * 1024,
            max_script_len: config.script_max_len,
            default_timeout: config.script_default_timeout,
            max_timeout: config.script_max_timeout,
        }
    }
}

/// Result of one script execution (spec §4.7 step 6).
pub struct ScriptOutcome {
    pub result: Json,
    pub console_logs: Vec<ConsoleEntry>,
    pub duration: Duration,
    pub execution_id: ExecutionId,
    /// Bytes of heap growth observed between acquiring the VM handle and
    /// the execution finishing, whichever way it finished.
    pub memory_delta: usize,
}

pub struct ScriptEngine {
    pool: VmPool,
    sandbox: Sandbox,
    audit: Arc<dyn AuditLogger>,
    config: ScriptEngineConfig,
}

impl ScriptEngine {
    pub fn new(config: ScriptEngineConfig) -> CoreResult<Self> {
        Self::with_audit_logger(config, Arc::new(TracingAuditLogger))
    }

    pub fn with_audit_logger(config: ScriptEngineConfig, audit: Arc<dyn AuditLogger>) -> CoreResult<Self> {
        let pool = VmPool::new(config.pool_size, config.max_memory_bytes)?;
        let sandbox = Sandbox::new(config.max_script_len);
        Ok(Self { pool, sandbox, audit, config })
    }

    /// Executes `source` under `context` with `input` as parameters,
    /// following the protocol in spec §4.7: assign/log, validate, acquire
    /// under deadline, install+inject+monitor, race completion against
    /// deadline and interruption, extract and audit.
    pub async fn execute(
        &self,
        source: &str,
        context: ExecutionContext,
        input: Json,
        requested_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> CoreResult<ScriptOutcome> {
        let start = Instant::now();
        let hash = audit::script_hash(source);
        let execution_id = context.execution_id;

        tracing::debug!(execution_id = %execution_id, script_hash = %hash, "script execution attempt");

        let validation = self.sandbox.validate(source);
        if let Err(e) = &validation {
            self.record_audit(&context, &hash, start.elapsed(), Some(e));
        }
        validation?;

        let deadline = requested_timeout.unwrap_or(self.config.default_timeout).min(self.config.max_timeout);

        let handle = match tokio::time::timeout(deadline, self.pool.get(cancel)).await {
            Ok(Ok(handle)) => Arc::new(handle),
            Ok(Err(e)) => {
                self.record_audit(&context, &hash, start.elapsed(), Some(&e));
                return Err(e);
            }
            Err(_) => {
                let e = CoreError::ScriptTimeout { phase: ScriptPhase::Execution };
                self.record_audit(&context, &hash, start.elapsed(), Some(&e));
                return Err(e);
            }
        };

        let memory_before = handle.memory_used_bytes();
        let result = self.run_on_handle(handle.clone(), source, &context, input, deadline, cancel).await;
        let memory_after = handle.memory_used_bytes();
        self.pool.replace().await;

        let duration = start.elapsed();
        self.record_audit(&context, &hash, duration, result.as_ref().err());

        match result {
            Ok((json, console_logs)) => Ok(ScriptOutcome {
                result: json,
                console_logs,
                duration,
                execution_id,
                memory_delta: memory_after.saturating_sub(memory_before),
            }),
            Err(e) => Err(e),
        }
    }

    async fn run_on_handle(
        &self,
        handle: Arc<super::pool::VMHandle>,
        source: &str,
        context: &ExecutionContext,
        input: Json,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> CoreResult<(Json, Vec<ConsoleEntry>)> {
        let console_capture = ConsoleCapture::new();

        let setup: Result<(), CoreError> = handle.context.with(|ctx| {
            console::install(&ctx, console_capture.clone())
                .map_err(|e| CoreError::CompilationError { phase: ScriptPhase::Execution, message: e.to_string() })?;
            context::inject(&ctx, context, &input)
        });
        setup?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut violations = monitor::spawn(handle.clone(), deadline, self.config.max_memory_bytes, stop_rx);

        let wrapped = format!("(function() {{\n{source}\n}})();");
        let exec_handle = handle.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let task = tokio::task::spawn_blocking(move || {
            let outcome = exec_handle.context.with(|ctx| -> Result<Json, CoreError> {
                let value: rquickjs::Value = ctx.eval(wrapped.as_bytes()).map_err(|e| script_err(&ctx, e))?;
                convert::js_to_json(&ctx, &value)
            });
            let _ = tx.send(outcome);
        });

        let result = tokio::select! {
            received = rx => {
                let _ = stop_tx.send(true);
                match received {
                    Ok(Ok(json)) => Ok(json),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(CoreError::Internal("script execution task ended unexpectedly".into())),
                }
            }
            changed = violations.changed() => {
                let _ = stop_tx.send(true);
                let violation = *violations.borrow();
                let _ = task.await;
                match (changed, violation) {
                    (Ok(()), Some(MonitorViolation::Memory)) => Err(CoreError::Interrupted {
                        phase: ScriptPhase::Execution,
                        kind: InterruptKind::MemoryExceeded,
                    }),
                    _ => Err(CoreError::ScriptTimeout { phase: ScriptPhase::Execution }),
                }
            }
            _ = cancel.cancelled() => {
                handle.interrupt();
                let _ = stop_tx.send(true);
                let _ = task.await;
                Err(CoreError::Timeout)
            }
        };

        let console_logs = console_capture.drain();
        result.map(|json| (json, console_logs))
    }

    fn record_audit(&self, context: &ExecutionContext, hash: &str, duration: Duration, error: Option<&CoreError>) {
        self.audit.record(audit::AuditRecord {
            execution_id: context.execution_id,
            tenant_id: context.tenant_id.clone(),
            workflow_id: context.workflow_id.clone(),
            node_id: context.node_id.clone(),
            user_id: context.user_id.clone(),
            script_hash: hash.to_string(),
            success: error.is_none(),
            duration,
            error: error.map(|e| e.to_string()),
            recorded_at: chrono::Utc::now(),
        });
    }
}

/// Distinguishes a thrown JS exception (caught via `ctx.catch()`, a
/// script-level error) from a host-side compilation/API error.
fn script_err(ctx: &rquickjs::Ctx<'_>, e: rquickjs::Error) -> CoreError {
    if matches!(e, rquickjs::Error::Exception) {
        let message = ctx
            .catch()
            .as_exception()
            .and_then(|exc| exc.message())
            .unwrap_or_else(|| "script raised an exception".to_string());
        CoreError::ScriptExecutionError { phase: ScriptPhase::Execution, message }
    } else {
        CoreError::CompilationError { phase: ScriptPhase::Execution, message: e.to_string() }
    }
}
