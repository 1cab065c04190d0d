// Console capture (spec §4.7): installs `log/warn/error/info/debug`
// hooks on the interpreter's `console` global that append structured
// entries instead of writing anywhere — the captured log is part of the
// result envelope returned to the workflow node, not printed.

use super::convert::js_to_json;
use chrono::{DateTime, Utc};
use rquickjs::{Ctx, Function, Object};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub timestamp: DateTime<Utc>,
    pub args: Vec<Value>,
}

/// Shared sink a fresh `console.*` call appends to. Cloned cheaply and
/// handed to the monitor/engine so the captured log survives even if the
/// script is interrupted mid-execution.
#[derive(Clone, Default)]
pub struct ConsoleCapture(Arc<Mutex<Vec<ConsoleEntry>>>);

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: ConsoleLevel, args: Vec<Value>) {
        self.0.lock().unwrap().push(ConsoleEntry {
            level,
            timestamp: Utc::now(),
            args,
        });
    }

    pub fn drain(&self) -> Vec<ConsoleEntry> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Installs the `console` global on a fresh interpreter context, wired
/// to `capture`. Called once per execution — the pool always hands out a
/// freshly constructed interpreter, so there is no prior `console` state
/// to clobber (spec §4.7 "VM isolation").
pub fn install(ctx: &Ctx<'_>, capture: ConsoleCapture) -> Result<(), rquickjs::Error> {
    let console = Object::new(ctx.clone())?;
    for level in [
        ConsoleLevel::Log,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
        ConsoleLevel::Info,
        ConsoleLevel::Debug,
    ] {
        let sink = capture.clone();
        let name = match level {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Debug => "debug",
        };
        let func = Function::new(ctx.clone(), move |ctx: Ctx<'_>, args: rquickjs::function::Rest<rquickjs::Value>| {
            let values: Vec<Value> = args
                .0
                .iter()
                .map(|v| js_to_json(&ctx, v).unwrap_or(Value::Null))
                .collect();
            sink.push(level, values);
        })?;
        console.set(name, func)?;
    }
    ctx.globals().set("console", console)?;
    Ok(())
}
