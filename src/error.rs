// Core error taxonomy — single canonical error enum for the runtime, built
// with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (Validation, Auth, Http, …).
//   • `is_retryable` / `is_permanent` are total predicates used by the
//     retry loop and the scheduler's failure path — callers must not
//     match on variants directly when deciding to retry.
//   • No variant carries secret material (API keys, tokens, passwords).

use thiserror::Error;

/// Phase tag attached to script-engine errors (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Validation,
    Execution,
    Extraction,
}

impl std::fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptPhase::Validation => write!(f, "validation"),
            ScriptPhase::Execution => write!(f, "execution"),
            ScriptPhase::Extraction => write!(f, "extraction"),
        }
    }
}

/// Why a script interruption happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    MemoryExceeded,
    StackExceeded,
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed config/input, field-addressed.
    #[error("validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Credential/refresh failures.
    #[error("auth error: {0}")]
    Auth(String),

    /// Wraps an HTTP status/body from a downstream call.
    #[error("http error: status={status} body={body}")]
    Http { status: u16, body: String },

    /// Integration-named failure with a retryable flag.
    #[error("execution error in '{integration}': {message}")]
    Execution {
        integration: String,
        message: String,
        retryable: bool,
    },

    /// Lower-level transport failure (DNS, connect, TLS, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// A deadline elapsed before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// Upstream signaled rate limiting (429, or a provider-specific header).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The circuit breaker refused to admit the request.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// Too many concurrent requests admitted in half-open state.
    #[error("circuit breaker '{name}' rejected: half-open slot exhausted")]
    TooManyRequests { name: String },

    /// Script engine: empty source.
    #[error("[{phase}] script is empty")]
    EmptyScript { phase: ScriptPhase },

    /// Script engine: source exceeds the configured length bound.
    #[error("[{phase}] script exceeds maximum length")]
    ScriptTooLong { phase: ScriptPhase },

    /// Script engine: denylisted identifier/API referenced.
    #[error("[{phase}] sandbox violation: {identifier}")]
    SandboxViolation {
        phase: ScriptPhase,
        identifier: String,
    },

    /// Script engine: source failed to compile/parse.
    #[error("[{phase}] compilation error: {message}")]
    CompilationError { phase: ScriptPhase, message: String },

    /// Script engine: a runtime exception was thrown during execution.
    #[error("[{phase}] execution error: {message}")]
    ScriptExecutionError { phase: ScriptPhase, message: String },

    /// Script engine: timeout while waiting on the result channel.
    #[error("[{phase}] script timed out")]
    ScriptTimeout { phase: ScriptPhase },

    /// Script engine: interrupted by the resource monitor.
    #[error("[{phase}] script interrupted: {kind:?}")]
    Interrupted {
        phase: ScriptPhase,
        kind: InterruptKind,
    },

    /// Script engine: result value could not be converted to the host model.
    #[error("[{phase}] extraction error: {message}")]
    ExtractionError { phase: ScriptPhase, message: String },

    /// Script engine: the VM pool has been closed.
    #[error("vm pool is closed")]
    PoolClosed,

    /// Plugin manifest/hash/permission rejection.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// Catch-all for errors without a dedicated variant yet. Prefer adding
    /// a specific variant over using this in new code.
    #[error("{0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn execution(integration: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Execution {
            integration: integration.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Whether the retry loop should attempt this error again.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Transport(_) | CoreError::Timeout | CoreError::RateLimited(_) => true,
            CoreError::Http { status, .. } => matches!(status, 408 | 429) || *status >= 500,
            CoreError::Execution { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Whether this error represents a permanent (non-retryable) failure
    /// class — distinct from `!is_retryable()` in that some errors (e.g.
    /// `CircuitOpen`) are neither retryable by the caller's loop nor
    /// "permanent" in the sense of a 4xx client error.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            CoreError::Http { status, .. } if matches!(status, 400 | 401 | 403 | 404)
        )
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CoreError::Timeout
        } else {
            CoreError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::validation("body", e.to_string())
    }
}
