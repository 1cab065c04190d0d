// Process-wide configuration — loaded once at startup from the environment.
// No config crate: the teacher reads individual env vars directly with
// sensible fallbacks, and the runtime's knobs are few enough that a single
// `from_env()` constructor is clearer than a layered config system.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// Process-wide runtime limits and the master encryption key.
///
/// Constructed once at startup (`CoreConfig::from_env`) and shared via
/// `Arc` by every engine that needs it. No field is ever mutated after
/// construction — see spec §5 "Process-wide global state".
#[derive(Clone)]
pub struct CoreConfig {
    /// 32-byte master key used to wrap per-credential DEKs.
    pub master_key: [u8; 32],
    /// Default VM pool size for the script engine.
    pub script_pool_size: usize,
    /// Hard ceiling on script execution time, regardless of caller request.
    pub script_max_timeout: Duration,
    /// Default per-script timeout when the caller doesn't request one.
    pub script_default_timeout: Duration,
    /// Hard memory ceiling per interpreter instance.
    pub script_max_memory_mb: usize,
    /// Maximum accepted script source length, in bytes.
    pub script_max_len: usize,
    /// Scheduler tick interval.
    pub scheduler_check_interval: Duration,
    /// Max schedules dispatched per tick.
    pub scheduler_batch_size: usize,
    /// Max concurrent dispatches per tick.
    pub scheduler_concurrency: usize,
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

impl CoreConfig {
    /// Load configuration from the environment.
    ///
    /// `CADENCE_MASTER_KEY` must be base64 of exactly 32 bytes; if unset, a
    /// fresh random key is generated (acceptable for local dev and tests,
    /// never for a durable deployment — any restart invalidates all
    /// persisted credentials).
    pub fn from_env() -> CoreResult<Self> {
        let master_key = match std::env::var("CADENCE_MASTER_KEY") {
            Ok(encoded) => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| CoreError::validation("CADENCE_MASTER_KEY", e.to_string()))?;
                if bytes.len() != 32 {
                    return Err(CoreError::validation(
                        "CADENCE_MASTER_KEY",
                        "must decode to exactly 32 bytes",
                    ));
                }
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                key
            }
            Err(_) => crate::credentials::envelope::generate_master_key(),
        };

        Ok(Self {
            master_key,
            script_pool_size: env_usize("CADENCE_SCRIPT_POOL_SIZE", 10),
            script_max_timeout: env_duration_secs("CADENCE_SCRIPT_MAX_TIMEOUT_SECS", 30),
            script_default_timeout: env_duration_secs("CADENCE_SCRIPT_DEFAULT_TIMEOUT_SECS", 5),
            script_max_memory_mb: env_usize("CADENCE_SCRIPT_MAX_MEMORY_MB", 64),
            script_max_len: env_usize("CADENCE_SCRIPT_MAX_LEN_BYTES", 64 * 1024),
            scheduler_check_interval: env_duration_secs("CADENCE_SCHEDULER_INTERVAL_SECS", 30),
            scheduler_batch_size: env_usize("CADENCE_SCHEDULER_BATCH_SIZE", 100),
            scheduler_concurrency: env_usize("CADENCE_SCHEDULER_CONCURRENCY", 10),
        })
    }
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("master_key", &"<redacted>")
            .field("script_pool_size", &self.script_pool_size)
            .field("script_max_timeout", &self.script_max_timeout)
            .field("script_default_timeout", &self.script_default_timeout)
            .field("script_max_memory_mb", &self.script_max_memory_mb)
            .field("script_max_len", &self.script_max_len)
            .field("scheduler_check_interval", &self.scheduler_check_interval)
            .field("scheduler_batch_size", &self.scheduler_batch_size)
            .field("scheduler_concurrency", &self.scheduler_concurrency)
            .finish()
    }
}
