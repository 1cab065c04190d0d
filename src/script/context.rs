// Context injector (spec §4.7): attaches the `ExecutionContext` object
// and the node's input parameters to the interpreter's global scope
// before the script body runs.

use super::convert::json_to_js;
use crate::error::{CoreError, ScriptPhase};
use crate::ids::ExecutionId;
use rquickjs::Ctx;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host-side metadata available to a script as the `context` global.
/// Mirrors the fields the audit log records (spec §4.7 "Tracer / Audit
/// logger"), since both describe "who is running this and why".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub tenant_id: String,
    pub workflow_id: String,
    pub node_id: String,
    pub user_id: Option<String>,
}

/// Injects `context` (the [`ExecutionContext`], as a plain JS object) and
/// `input` (the node's parameters) into `ctx`'s global scope.
pub fn inject(ctx: &Ctx<'_>, execution_context: &ExecutionContext, input: &Value) -> Result<(), CoreError> {
    let context_json = serde_json::to_value(execution_context)
        .map_err(|e| CoreError::ExtractionError { phase: ScriptPhase::Execution, message: e.to_string() })?;
    let context_js = json_to_js(ctx, &context_json)?;
    let input_js = json_to_js(ctx, input)?;

    ctx.globals()
        .set("context", context_js)
        .map_err(|e| CoreError::ExtractionError { phase: ScriptPhase::Execution, message: e.to_string() })?;
    ctx.globals()
        .set("input", input_js)
        .map_err(|e| CoreError::ExtractionError { phase: ScriptPhase::Execution, message: e.to_string() })?;
    Ok(())
}
