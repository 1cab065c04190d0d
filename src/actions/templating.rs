// Minimal `{{path.to.value}}` substitution against a JSON parameter
// tree. Dotted paths only — no expressions, filters, or loops — because
// the action contracts only ever need to splice input parameters into a
// URL or body, not to template control flow.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}").unwrap())
}

pub fn contains_template(s: &str) -> bool {
    s.contains("{{")
}

fn lookup<'a>(params: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = params;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Expand every `{{path}}` occurrence in `template` against `params`.
/// An unresolved path is left as an empty string rather than erroring —
/// action validation is responsible for catching missing required
/// parameters before dispatch.
pub fn expand_string(template: &str, params: &Value) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            lookup(params, path).map(scalar_to_string).unwrap_or_default()
        })
        .into_owned()
}

/// Expand templates recursively through a JSON value — every string leaf
/// is run through [`expand_string`]; other value kinds pass through.
pub fn expand_value(template: &Value, params: &Value) -> Value {
    match template {
        Value::String(s) => Value::String(expand_string(s, params)),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_value(v, params)).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), expand_value(v, params));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
