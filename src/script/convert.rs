// JSON <-> QuickJS value conversion. `rquickjs` ships no `serde`
// integration for this crate's feature set (only `array-buffer` and
// `chrono`), so the host value model boundary — converting the script's
// return value and console arguments into the `serde_json::Value` the
// rest of this crate speaks — is a small hand-rolled recursive walk.

use crate::error::{CoreError, ScriptPhase};
use rquickjs::{Ctx, Type, Value};
use serde_json::{Map, Number, Value as Json};

/// Converts a JSON value into a QuickJS value bound to `ctx`, used to
/// inject `context`/`input` into the global scope (spec §4.7 "context
/// injector").
pub fn json_to_js<'js>(ctx: &Ctx<'js>, value: &Json) -> Result<Value<'js>, CoreError> {
    let result = match value {
        Json::Null => Value::new_null(ctx.clone()),
        Json::Bool(b) => Value::new_bool(ctx.clone(), *b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::new_number(ctx.clone(), i as f64)
            } else {
                Value::new_number(ctx.clone(), n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => rquickjs::String::from_str(ctx.clone(), s)
            .map(|v| v.into_value())
            .map_err(|e| js_err(ScriptPhase::Validation, e))?,
        Json::Array(items) => {
            let arr = rquickjs::Array::new(ctx.clone()).map_err(|e| js_err(ScriptPhase::Validation, e))?;
            for (idx, item) in items.iter().enumerate() {
                arr.set(idx, json_to_js(ctx, item)?).map_err(|e| js_err(ScriptPhase::Validation, e))?;
            }
            arr.into_value()
        }
        Json::Object(map) => {
            let obj = rquickjs::Object::new(ctx.clone()).map_err(|e| js_err(ScriptPhase::Validation, e))?;
            for (key, item) in map {
                obj.set(key.as_str(), json_to_js(ctx, item)?).map_err(|e| js_err(ScriptPhase::Validation, e))?;
            }
            obj.into_value()
        }
    };
    Ok(result)
}

/// Converts a QuickJS value back into `serde_json::Value` for the
/// result envelope and console-captured arguments (spec §4.7 step 6
/// "extract result"). Functions, symbols, and other non-serializable
/// values become `null` rather than failing the whole extraction.
pub fn js_to_json(ctx: &Ctx<'_>, value: &Value<'_>) -> Result<Json, CoreError> {
    let json = match value.type_of() {
        Type::Undefined | Type::Null | Type::Uninitialized => Json::Null,
        Type::Bool => Json::Bool(value.as_bool().unwrap_or(false)),
        Type::Int => Json::Number(Number::from(value.as_int().unwrap_or(0))),
        Type::Float => Number::from_f64(value.as_float().unwrap_or(0.0)).map(Json::Number).unwrap_or(Json::Null),
        Type::String => {
            let s = value
                .as_string()
                .ok_or_else(|| extraction_err("expected a string value"))?
                .to_string()
                .map_err(|e| js_err(ScriptPhase::Extraction, e))?;
            Json::String(s)
        }
        Type::Array => {
            let arr = value.as_array().ok_or_else(|| extraction_err("expected an array value"))?;
            let mut items = Vec::with_capacity(arr.len());
            for item in arr.iter::<Value>() {
                let item = item.map_err(|e| js_err(ScriptPhase::Extraction, e))?;
                items.push(js_to_json(ctx, &item)?);
            }
            Json::Array(items)
        }
        Type::Object | Type::Exception => {
            let obj = value.as_object().ok_or_else(|| extraction_err("expected an object value"))?;
            let mut map = Map::new();
            for key in obj.keys::<String>() {
                let key = key.map_err(|e| js_err(ScriptPhase::Extraction, e))?;
                let v: Value = obj.get(key.as_str()).map_err(|e| js_err(ScriptPhase::Extraction, e))?;
                map.insert(key, js_to_json(ctx, &v)?);
            }
            Json::Object(map)
        }
        // Functions, symbols, bigints, etc. carry no JSON-serializable
        // payload the host model cares about.
        _ => Json::Null,
    };
    Ok(json)
}

fn js_err(phase: ScriptPhase, e: rquickjs::Error) -> CoreError {
    CoreError::ExtractionError {
        phase,
        message: e.to_string(),
    }
}

fn extraction_err(message: &str) -> CoreError {
    CoreError::ExtractionError {
        phase: ScriptPhase::Extraction,
        message: message.to_string(),
    }
}
