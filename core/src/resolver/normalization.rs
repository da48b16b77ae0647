#![deny(missing_docs)]

//! # Document Normalization
//!
//! The simple whole-document rewrites of the resolver:
//!
//! - path unification (`x-ms-paths` into `paths`)
//! - permissiveness default (`additionalProperties: false`)
//! - host-parameter merge (`x-ms-parameterized-host`)
//! - nullability widening (`x-nullable` / optional into `oneOf [T, null]`)
//!
//! Every rewrite is a no-op on its own output.

use super::{for_each_operation, malformed, PassError};
use crate::pointer::{ref_of, DefRef};
use serde_json::{json, Map, Value};

/// Secondary path table.
pub const EXTRA_PATHS: &str = "x-ms-paths";
/// Host template descriptor.
pub const PARAMETERIZED_HOST: &str = "x-ms-parameterized-host";
/// Explicit nullability marker.
pub const NULLABLE: &str = "x-nullable";

/// Pass 2: unions `x-ms-paths` into `paths`. The secondary table wins on
/// equal keys; no conflict detection is performed.
pub(crate) fn unify_paths(doc: &mut Value) -> Result<(), PassError> {
    let Some(extra) = doc.get(EXTRA_PATHS).and_then(Value::as_object).cloned() else {
        return Ok(());
    };
    let root = doc
        .as_object_mut()
        .ok_or_else(|| malformed("document root is not an object"))?;
    let paths = root
        .entry("paths")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed("'paths' is not an object"))?;
    for (path, item) in extra {
        paths.insert(path, item);
    }
    Ok(())
}

/// Pass 8: object definitions that declare properties but say nothing about
/// additional properties are closed.
pub(crate) fn default_additional_properties(doc: &mut Value) -> Result<(), PassError> {
    let Some(definitions) = doc.get_mut("definitions").and_then(Value::as_object_mut) else {
        return Ok(());
    };
    for schema in definitions.values_mut() {
        let Some(map) = schema.as_object_mut() else {
            continue;
        };
        let has_properties = map
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|p| !p.is_empty());
        let object_typed = map.get("type").map_or(true, |t| t == "object");
        if has_properties && object_typed && !map.contains_key("additionalProperties") {
            map.insert("additionalProperties".to_string(), Value::Bool(false));
        }
    }
    Ok(())
}

/// Pass 9: appends host-template parameters to every operation.
pub(crate) fn merge_host_parameters(doc: &mut Value) -> Result<(), PassError> {
    let host_params: Vec<Value> = doc
        .get(PARAMETERIZED_HOST)
        .and_then(|h| h.get("parameters"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if host_params.is_empty() {
        return Ok(());
    }

    for_each_operation(doc, |path, method, operation| {
        let op = operation
            .as_object_mut()
            .ok_or_else(|| malformed(format!("operation {method} {path} is not an object")))?;
        let params = op
            .entry("parameters")
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| malformed(format!("parameters of {method} {path} are not a list")))?;
        for param in &host_params {
            if !params.contains(param) {
                params.push(param.clone());
            }
        }
        Ok(())
    })
}

/// Pass 10: widens nullable properties, body parameters and response
/// schemas to `oneOf [original, {type: null}]`.
pub(crate) fn widen_nullable(doc: &mut Value) -> Result<(), PassError> {
    let definitions = doc
        .get("definitions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(defs) = doc.get_mut("definitions").and_then(Value::as_object_mut) {
        for schema in defs.values_mut() {
            widen_properties(schema, &definitions);
        }
    }

    if let Some(params) = doc.get_mut("parameters").and_then(Value::as_object_mut) {
        for param in params.values_mut() {
            widen_body_parameter(param, &definitions);
        }
    }
    if let Some(responses) = doc.get_mut("responses").and_then(Value::as_object_mut) {
        for response in responses.values_mut() {
            widen_response(response, &definitions);
        }
    }

    for_each_operation(doc, |_, _, operation| {
        if let Some(params) = operation
            .get_mut("parameters")
            .and_then(Value::as_array_mut)
        {
            for param in params.iter_mut() {
                widen_body_parameter(param, &definitions);
            }
        }
        if let Some(responses) = operation
            .get_mut("responses")
            .and_then(Value::as_object_mut)
        {
            for response in responses.values_mut() {
                widen_response(response, &definitions);
            }
        }
        Ok(())
    })
}

fn widen_properties(schema: &mut Value, definitions: &Map<String, Value>) {
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let Some(props) = schema.get_mut("properties").and_then(Value::as_object_mut) else {
        return;
    };
    for (name, prop) in props.iter_mut() {
        let flag = nullable_flag(prop, definitions);
        let nullable = flag == Some(true) || (flag.is_none() && !required.contains(name));
        if nullable {
            widen(prop);
        }
    }
}

fn widen_body_parameter(param: &mut Value, definitions: &Map<String, Value>) {
    if param.get("in").and_then(Value::as_str) != Some("body") {
        return;
    }
    let required = param.get("required").and_then(Value::as_bool) == Some(true);
    let param_flag = param.get(NULLABLE).and_then(Value::as_bool);
    let Some(schema) = param.get_mut("schema") else {
        return;
    };
    let flag = param_flag.or_else(|| nullable_flag(schema, definitions));
    if flag == Some(true) || (flag.is_none() && !required) {
        widen(schema);
    }
}

fn widen_response(response: &mut Value, definitions: &Map<String, Value>) {
    let response_flag = response.get(NULLABLE).and_then(Value::as_bool);
    let Some(schema) = response.get_mut("schema") else {
        return;
    };
    let flag = response_flag.or_else(|| nullable_flag(schema, definitions));
    if flag == Some(true) {
        widen(schema);
    }
}

/// `x-nullable` on the schema itself, or on the definition it references.
fn nullable_flag(schema: &Value, definitions: &Map<String, Value>) -> Option<bool> {
    if let Some(flag) = schema.get(NULLABLE).and_then(Value::as_bool) {
        return Some(flag);
    }
    let name = ref_of(schema).and_then(|r| DefRef::from_fragment(r).definition_name())?;
    definitions
        .get(&name)
        .and_then(|d| d.get(NULLABLE))
        .and_then(Value::as_bool)
}

/// True for `{type: "null"}`.
pub fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

/// True if `schema` is already an alternative set admitting `null`.
pub fn is_widened(schema: &Value) -> bool {
    schema
        .get("oneOf")
        .and_then(Value::as_array)
        .is_some_and(|alts| alts.iter().any(is_null_schema))
}

/// The non-null member of a widened schema, or the schema itself.
pub fn unwrap_nullable_mut(schema: &mut Value) -> &mut Value {
    if !is_widened(schema) {
        return schema;
    }
    let idx = schema["oneOf"]
        .as_array()
        .and_then(|alts| alts.iter().position(|a| !is_null_schema(a)));
    match idx {
        Some(i) => &mut schema["oneOf"][i],
        None => schema,
    }
}

fn widen(schema: &mut Value) {
    if is_widened(schema) || is_null_schema(schema) {
        return;
    }
    let original = std::mem::take(schema);
    *schema = json!({ "oneOf": [original, { "type": "null" }] });
}
