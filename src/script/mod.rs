//! Sandboxed Script Engine (component F): executes short JavaScript
//! snippets under an enforced time/memory budget, returning a JSON-like
//! result plus captured console output.

pub mod audit;
pub mod console;
pub mod context;
pub mod convert;
pub mod engine;
pub mod monitor;
pub mod pool;
pub mod sandbox;

pub use audit::{AuditLogger, AuditRecord, TracingAuditLogger};
pub use console::{ConsoleCapture, ConsoleEntry, ConsoleLevel};
pub use context::ExecutionContext;
pub use engine::{ScriptEngine, ScriptEngineConfig, ScriptOutcome};
pub use sandbox::Sandbox;
