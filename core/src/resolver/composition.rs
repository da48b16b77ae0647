#![deny(missing_docs)]

//! # Composition Flattening
//!
//! Merges each `allOf` parent into its child definition: properties (the
//! child wins on a name clash), required names, and the resource marker.
//! A parent is flattened before it is merged and at most once per pass, so
//! a parent shared by many children is merged the same way everywhere.

use super::{malformed, PassError};
use crate::pointer::{ref_of, DefRef};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Resource marker propagated from parents to children.
pub const RESOURCE_MARKER: &str = "x-ms-azure-resource";

/// Composition parents per child definition, captured before cleanup.
pub type CompositionParents = IndexMap<DefRef, Vec<DefRef>>;

/// Pass 5.
pub(crate) fn flatten_compositions(doc: &mut Value) -> Result<CompositionParents, PassError> {
    let Some(definitions) = doc.get_mut("definitions").and_then(Value::as_object_mut) else {
        return Ok(IndexMap::new());
    };

    let names: Vec<String> = definitions.keys().cloned().collect();
    let mut flattener = Flattener {
        done: HashSet::new(),
        parents: IndexMap::new(),
    };
    for name in &names {
        flattener.flatten(definitions, name)?;
    }
    Ok(flattener.parents)
}

/// Pass 7: drops every `allOf` list from the definitions.
pub(crate) fn remove_compositions(doc: &mut Value) -> Result<(), PassError> {
    if let Some(definitions) = doc.get_mut("definitions").and_then(Value::as_object_mut) {
        for schema in definitions.values_mut() {
            if let Some(map) = schema.as_object_mut() {
                map.remove("allOf");
            }
        }
    }
    Ok(())
}

struct Flattener {
    done: HashSet<String>,
    parents: CompositionParents,
}

impl Flattener {
    fn flatten(&mut self, definitions: &mut Map<String, Value>, name: &str) -> Result<(), PassError> {
        if !self.done.insert(name.to_string()) {
            return Ok(());
        }
        let entries = match definitions.get(name).and_then(|d| d.get("allOf")) {
            None => return Ok(()),
            Some(Value::Array(entries)) => entries.clone(),
            Some(_) => return Err(malformed(format!("allOf of '{}' is not a list", name))),
        };

        for entry in entries {
            let parent = match ref_of(&entry) {
                Some(r) => {
                    let parent_ref = DefRef::from_fragment(r);
                    let parent_name = parent_ref.definition_name().ok_or_else(|| {
                        malformed(format!("'{}' composes from non-definition {}", name, r))
                    })?;
                    self.flatten(definitions, &parent_name)?;
                    self.parents
                        .entry(DefRef::definition(name))
                        .or_default()
                        .push(parent_ref);
                    definitions.get(&parent_name).cloned().ok_or_else(|| {
                        malformed(format!("parent '{}' of '{}' is missing", parent_name, name))
                    })?
                }
                None => entry,
            };

            let child = definitions
                .get_mut(name)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| malformed(format!("definition '{}' is not an object", name)))?;
            merge_parent(child, &parent);
        }
        debug!(definition = name, "composition flattened");
        Ok(())
    }
}

fn merge_parent(child: &mut Map<String, Value>, parent: &Value) {
    if let Some(parent_props) = parent.get("properties").and_then(Value::as_object) {
        let own = match child.remove("properties") {
            Some(Value::Object(own)) => own,
            _ => Map::new(),
        };
        let mut merged = Map::new();
        for (key, schema) in parent_props {
            if !own.contains_key(key) {
                merged.insert(key.clone(), schema.clone());
            }
        }
        merged.extend(own);
        child.insert("properties".to_string(), Value::Object(merged));
    }

    if let Some(parent_required) = parent.get("required").and_then(Value::as_array) {
        let mut required: Vec<Value> = parent_required.clone();
        if let Some(Value::Array(own)) = child.get("required") {
            for name in own {
                if !required.contains(name) {
                    required.push(name.clone());
                }
            }
        }
        child.insert("required".to_string(), Value::Array(required));
    }

    if parent.get(RESOURCE_MARKER).and_then(Value::as_bool) == Some(true) {
        child.insert(RESOURCE_MARKER.to_string(), Value::Bool(true));
    }

    if !child.contains_key("type") {
        if let Some(ty) = parent.get("type") {
            child.insert("type".to_string(), ty.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_child_gains_parent_properties_and_requirements() {
        let mut value = doc(
            r##"
definitions:
  P:
    type: object
    x-ms-azure-resource: true
    required: [id]
    properties:
      id: {type: string}
  C:
    allOf: [{$ref: "#/definitions/P"}]
    required: [name]
    properties:
      name: {type: string}
"##,
        );
        let parents = flatten_compositions(&mut value).unwrap();
        let c = &value["definitions"]["C"];
        let props: Vec<&String> = c["properties"].as_object().unwrap().keys().collect();
        assert_eq!(props, vec!["id", "name"]);
        assert_eq!(c["required"], json!(["id", "name"]));
        assert_eq!(c[RESOURCE_MARKER], true);
        assert_eq!(c["type"], "object");
        assert_eq!(
            parents[&DefRef::definition("C")],
            vec![DefRef::definition("P")]
        );
    }

    #[test]
    fn test_child_property_wins_and_grandparents_arrive() {
        let mut value = doc(
            r##"
definitions:
  C:
    allOf: [{$ref: "#/definitions/B"}]
    properties:
      id: {type: integer}
  B:
    allOf: [{$ref: "#/definitions/A"}]
    properties:
      id: {type: string}
  A:
    properties:
      root: {type: boolean}
"##,
        );
        flatten_compositions(&mut value).unwrap();
        let c = &value["definitions"]["C"]["properties"];
        assert_eq!(c["id"]["type"], "integer");
        assert_eq!(c["root"]["type"], "boolean");
    }

    #[test]
    fn test_inline_entries_are_merged() {
        let mut value = doc(
            r#"
definitions:
  C:
    allOf:
      - properties:
          extra: {type: string}
        required: [extra]
"#,
        );
        flatten_compositions(&mut value).unwrap();
        assert_eq!(value["definitions"]["C"]["required"], json!(["extra"]));
    }

    #[test]
    fn test_cleanup_removes_composition() {
        let mut value = doc(
            r##"
definitions:
  A: {properties: {a: {type: string}}}
  B: {allOf: [{$ref: "#/definitions/A"}]}
"##,
        );
        flatten_compositions(&mut value).unwrap();
        remove_compositions(&mut value).unwrap();
        assert!(value["definitions"]["B"].get("allOf").is_none());
        assert!(value["definitions"]["B"]["properties"].get("a").is_some());
    }

    #[test]
    fn test_malformed_composition_is_a_fault() {
        let mut value = doc("definitions: {A: {allOf: 3}}");
        assert!(matches!(
            flatten_compositions(&mut value),
            Err(PassError::Fault(_))
        ));
    }
}
