#![deny(missing_docs)]

//! # Inline-Definition Hoisting
//!
//! Moves anonymous object schemas into `#/definitions` so that composition
//! flattening, polymorphism expansion and the permissiveness default see
//! every object shape as a named definition.
//!
//! Names follow the owner: `Pet_owner` for a property, `Pet_tagsItem` for
//! the items of an inline array property, `{operationId}_{param}` for body
//! parameters and `{operationId}_{status}Response` for response bodies.

use super::{for_each_operation, malformed, PassError};
use crate::document::operation_id;
use crate::pointer::{ref_of, DefRef};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Pass 4.
pub(crate) fn hoist_inline_definitions(doc: &mut Value) -> Result<(), PassError> {
    let mut hoister = Hoister {
        taken: doc
            .get("definitions")
            .and_then(Value::as_object)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default(),
        hoisted: Vec::new(),
    };

    if let Some(defs) = doc.get_mut("definitions").and_then(Value::as_object_mut) {
        for (name, schema) in defs.iter_mut() {
            hoister.hoist_within(schema, name);
        }
    }

    if let Some(params) = doc.get_mut("parameters").and_then(Value::as_object_mut) {
        for (name, param) in params.iter_mut() {
            hoister.hoist_body_parameter(param, &format!("{}Parameter", name));
        }
    }
    if let Some(responses) = doc.get_mut("responses").and_then(Value::as_object_mut) {
        for (name, response) in responses.iter_mut() {
            if let Some(schema) = response.get_mut("schema") {
                hoister.hoist_slot(schema, &format!("{}Response", name));
            }
        }
    }

    for_each_operation(doc, |path, method, operation| {
        let op_id = operation_id(path, method, operation);
        if let Some(params) = operation
            .get_mut("parameters")
            .and_then(Value::as_array_mut)
        {
            for param in params.iter_mut() {
                let param_name = param
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("body")
                    .to_string();
                hoister.hoist_body_parameter(param, &format!("{}_{}", op_id, param_name));
            }
        }
        if let Some(responses) = operation
            .get_mut("responses")
            .and_then(Value::as_object_mut)
        {
            for (status, response) in responses.iter_mut() {
                if let Some(schema) = response.get_mut("schema") {
                    hoister.hoist_slot(schema, &format!("{}_{}Response", op_id, status));
                }
            }
        }
        Ok(())
    })?;

    if hoister.hoisted.is_empty() {
        return Ok(());
    }
    let defs = doc
        .as_object_mut()
        .ok_or_else(|| malformed("document root is not an object"))?
        .entry("definitions")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed("'definitions' is not an object"))?;
    for (name, schema) in hoister.hoisted {
        defs.insert(name, schema);
    }
    Ok(())
}

struct Hoister {
    taken: HashSet<String>,
    hoisted: Vec<(String, Value)>,
}

impl Hoister {
    /// Hoists the nested slots of a schema owned by `owner`.
    fn hoist_within(&mut self, schema: &mut Value, owner: &str) {
        if let Some(props) = schema.get_mut("properties").and_then(Value::as_object_mut) {
            for (prop, slot) in props.iter_mut() {
                self.hoist_slot(slot, &format!("{}_{}", owner, prop));
            }
        }
        if let Some(items) = schema.get_mut("items") {
            if items.is_object() {
                self.hoist_slot(items, &format!("{}Item", owner));
            }
        }
        if let Some(additional) = schema.get_mut("additionalProperties") {
            if additional.is_object() {
                self.hoist_slot(additional, &format!("{}Value", owner));
            }
        }
    }

    fn hoist_body_parameter(&mut self, param: &mut Value, name: &str) {
        if param.get("in").and_then(Value::as_str) != Some("body") {
            return;
        }
        if let Some(schema) = param.get_mut("schema") {
            self.hoist_slot(schema, name);
        }
    }

    fn hoist_slot(&mut self, slot: &mut Value, name: &str) {
        if unwrap_single_reference(slot) || ref_of(slot).is_some() {
            return;
        }
        if is_object_shaped(slot) {
            let name = self.reserve(name);
            self.hoist_within(slot, &name);
            let reference = Value::Object(Map::from_iter([(
                "$ref".to_string(),
                Value::String(DefRef::definition(&name).as_str().to_string()),
            )]));
            let schema = std::mem::replace(slot, reference);
            self.hoisted.push((name, schema));
        } else {
            self.hoist_within(slot, name);
        }
    }

    fn reserve(&mut self, name: &str) -> String {
        let base = sanitize_name(name);
        let mut candidate = base.clone();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Rewrites `{allOf: [{$ref}]}` without own properties to the bare
/// reference, keeping annotation siblings. Returns whether it did.
fn unwrap_single_reference(slot: &mut Value) -> bool {
    let Some(map) = slot.as_object_mut() else {
        return false;
    };
    if map.contains_key("properties") || map.contains_key("discriminator") {
        return false;
    }
    let reference = match map.get("allOf").and_then(Value::as_array) {
        Some(entries) if entries.len() == 1 => match ref_of(&entries[0]) {
            Some(r) => r.to_string(),
            None => return false,
        },
        _ => return false,
    };
    map.remove("allOf");
    map.remove("type");
    map.insert("$ref".to_string(), Value::String(reference));
    true
}

/// Anonymous schemas that deserve a name of their own.
fn is_object_shaped(schema: &Value) -> bool {
    let Some(map) = schema.as_object() else {
        return false;
    };
    if map.contains_key("$ref") {
        return false;
    }
    map.contains_key("properties")
        || map.contains_key("allOf")
        || map.contains_key("discriminator")
        || (map.get("type").and_then(Value::as_str) == Some("object")
            && map.get("additionalProperties").is_some_and(Value::is_object))
}

/// Restricts a generated name to `[A-Za-z0-9_.-]`.
pub fn sanitize_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let re = INVALID.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]+").expect("static regex"));
    re.replace_all(name, "_").trim_matches('_').to_string()
}
