// Denylist-based sandbox validation (spec §4.7). The QuickJS context
// this engine builds never registers a module loader, `require`, or any
// host networking/filesystem global, so capability removal is mostly
// "don't add it in the first place" — the denylist scan below catches
// source that still *references* one of those identifiers (or the
// handful of QuickJS globals that would otherwise leak ambient power),
// rejecting it before compilation rather than relying on a runtime
// reflection check.

use crate::error::{CoreError, ScriptPhase};
use regex::Regex;
use std::sync::OnceLock;

/// Identifiers a script may not reference anywhere in its source.
/// Matched as whole words, so `myRequire` is allowed but `require(...)`
/// is not.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "require",
    "import",
    "process",
    "globalThis",
    "global",
    "Function", // the indirect-eval escape hatch
    "eval",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "__proto__",
];

pub struct Sandbox {
    denylist: Vec<String>,
    max_script_len: usize,
}

fn word_regex(identifier: &str) -> Regex {
    Regex::new(&format!(r"\b{}\b", regex::escape(identifier))).expect("denylist identifiers are valid regex fragments")
}

static DEFAULT_PATTERNS: OnceLock<Vec<(String, Regex)>> = OnceLock::new();

fn default_patterns() -> &'static [(String, Regex)] {
    DEFAULT_PATTERNS.get_or_init(|| {
        DEFAULT_DENYLIST
            .iter()
            .map(|id| (id.to_string(), word_regex(id)))
            .collect()
    })
}

impl Sandbox {
    pub fn new(max_script_len: usize) -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            max_script_len,
        }
    }

    /// Extends the denylist with caller-supplied identifiers, e.g. a
    /// deployment that wants to additionally forbid a specific
    /// integration's global.
    pub fn with_extra_denied(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.denylist.extend(extra);
        self
    }

    /// Validates a script against length and denylist rules (spec §4.7
    /// step 2, §8 "script referencing a denied identifier fails with
    /// SandboxViolation before any execution"). Source is never compiled
    /// until this returns `Ok`.
    pub fn validate(&self, source: &str) -> Result<(), CoreError> {
        if source.trim().is_empty() {
            return Err(CoreError::EmptyScript { phase: ScriptPhase::Validation });
        }
        if source.len() > self.max_script_len {
            return Err(CoreError::ScriptTooLong { phase: ScriptPhase::Validation });
        }
        for (identifier, pattern) in default_patterns() {
            if pattern.is_match(source) {
                return Err(CoreError::SandboxViolation {
                    phase: ScriptPhase::Validation,
                    identifier: identifier.clone(),
                });
            }
        }
        for identifier in &self.denylist {
            if DEFAULT_DENYLIST.contains(&identifier.as_str()) {
                continue; // already checked via the precompiled patterns above
            }
            if word_regex(identifier).is_match(source) {
                return Err(CoreError::SandboxViolation {
                    phase: ScriptPhase::Validation,
                    identifier: identifier.clone(),
                });
            }
        }
        Ok(())
    }
}
