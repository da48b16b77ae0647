#![deny(missing_docs)]

//! # Polymorphism Expansion
//!
//! For every discriminator-bearing definition:
//!
//! - its subtype tree is built (see [`crate::polymorphic`]);
//! - the discriminator property of every base is pinned, on every node of
//!   the base's tree, to the node's wire name by merging into its `enum`.
//!   Nodes under nested discriminators get one pin per enclosing base;
//! - a discriminator map (wire name -> definition pointer) is attached under
//!   `x-discriminator-map`;
//! - for tree roots, every other reference to the base becomes a `oneOf` over
//!   the base and all of its descendants.

use super::normalization::unwrap_nullable_mut;
use super::{malformed, PassError, EXAMPLES_KEY};
use crate::pointer::{ref_of, DefRef};
use crate::polymorphic::PolymorphicTree;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Extension holding the discriminator map of a polymorphic base.
pub const DISCRIMINATOR_MAP: &str = "x-discriminator-map";

struct Pin {
    node: String,
    property: String,
    wire: String,
}

/// Pass 6.
pub(crate) fn expand_polymorphism(doc: &mut Value) -> Result<(), PassError> {
    let snapshot = match doc.get("definitions") {
        Some(Value::Object(defs)) => defs.clone(),
        Some(_) => return Err(malformed("'definitions' is not an object")),
        None => return Ok(()),
    };

    let bases: Vec<String> = snapshot
        .iter()
        .filter(|(_, schema)| schema.get("discriminator").and_then(Value::as_str).is_some())
        .map(|(name, _)| name.clone())
        .collect();
    if bases.is_empty() {
        return Ok(());
    }

    let mut tree = PolymorphicTree::new(&snapshot);
    for base in &bases {
        tree.build(base);
    }

    // Every base pins its own property on its whole subtree, so a node under
    // nested discriminators carries one pin per enclosing base.
    let mut pins: IndexMap<(String, String), String> = IndexMap::new();
    for base in &bases {
        let Some(property) = tree.node(base).map(|n| n.discriminator.clone()) else {
            continue;
        };
        for name in tree.descendants(base) {
            let wire = tree.wire_name(&name);
            pins.entry((name, property.clone())).or_insert(wire);
        }
    }
    let pins: Vec<Pin> = pins
        .into_iter()
        .map(|((node, property), wire)| Pin {
            node,
            property,
            wire,
        })
        .collect();

    let maps: Vec<(String, IndexMap<String, DefRef>)> = bases
        .iter()
        .map(|base| {
            let mapping = tree
                .alternatives(base)
                .into_iter()
                .filter_map(|alt| {
                    let name = alt.definition_name()?;
                    Some((tree.wire_name(&name), alt))
                })
                .collect();
            (base.clone(), mapping)
        })
        .collect();

    let nested: HashSet<String> = bases
        .iter()
        .flat_map(|base| {
            tree.descendants(base)
                .into_iter()
                .filter(move |d| d != base)
        })
        .collect();
    let rewrites: IndexMap<DefRef, Vec<DefRef>> = bases
        .iter()
        .filter(|base| !nested.contains(*base))
        .filter_map(|base| {
            let alternatives: Vec<DefRef> = tree.alternatives(base).into_iter().collect();
            (alternatives.len() > 1).then(|| (DefRef::definition(base), alternatives))
        })
        .collect();
    drop(tree);

    let definitions = doc
        .get_mut("definitions")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| malformed("'definitions' disappeared"))?;
    for pin in &pins {
        pin_discriminator(definitions, &snapshot, pin)?;
    }
    for (base, mapping) in &maps {
        attach_map(definitions, base, mapping)?;
    }

    if !rewrites.is_empty() {
        rewrite_references(doc, &rewrites, false);
        debug!(roots = rewrites.len(), "polymorphic references rewritten");
    }
    Ok(())
}

fn pin_discriminator(
    definitions: &mut Map<String, Value>,
    snapshot: &Map<String, Value>,
    pin: &Pin,
) -> Result<(), PassError> {
    let Some(node) = definitions.get_mut(&pin.node).and_then(Value::as_object_mut) else {
        return Ok(());
    };
    let props = node
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed(format!("properties of '{}' are not an object", pin.node)))?;

    let slot = props
        .entry(pin.property.clone())
        .or_insert_with(|| json!({"type": "string"}));
    let schema = unwrap_nullable_mut(slot);

    if let Some(target) = ref_of(schema).and_then(|r| DefRef::from_fragment(r).definition_name()) {
        let mut inline = snapshot.get(&target).cloned().unwrap_or_else(|| json!({}));
        if let (Value::Object(inline_map), Value::Object(site)) = (&mut inline, &*schema) {
            for (key, value) in site {
                if key != "$ref" {
                    inline_map.insert(key.clone(), value.clone());
                }
            }
        }
        *schema = inline;
    }

    let map = schema
        .as_object_mut()
        .ok_or_else(|| malformed(format!("discriminator of '{}' is not a schema", pin.node)))?;
    let wire = Value::String(pin.wire.clone());
    match map.get_mut("enum") {
        Some(Value::Array(values)) => {
            if !values.contains(&wire) {
                values.push(wire);
            }
        }
        _ => {
            map.insert("enum".to_string(), Value::Array(vec![wire]));
        }
    }
    Ok(())
}

fn attach_map(
    definitions: &mut Map<String, Value>,
    base: &str,
    mapping: &IndexMap<String, DefRef>,
) -> Result<(), PassError> {
    let Some(node) = definitions.get_mut(base).and_then(Value::as_object_mut) else {
        return Ok(());
    };
    let existing = node
        .entry(DISCRIMINATOR_MAP)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed(format!("{} of '{}' is not an object", DISCRIMINATOR_MAP, base)))?;
    for (wire, target) in mapping {
        if !existing.contains_key(wire) {
            existing.insert(wire.clone(), Value::String(target.as_str().to_string()));
        }
    }
    Ok(())
}

/// Rewrites `{$ref: base}` nodes outside `allOf`/`oneOf`/`anyOf` lists into
/// alternative sets, keeping sibling keywords on the wrapper.
fn rewrite_references(node: &mut Value, rewrites: &IndexMap<DefRef, Vec<DefRef>>, in_set: bool) {
    match node {
        Value::Object(map) => {
            if !in_set {
                let target = map
                    .get("$ref")
                    .and_then(Value::as_str)
                    .map(DefRef::from_fragment);
                if let Some(alternatives) = target.as_ref().and_then(|t| rewrites.get(t)) {
                    map.remove("$ref");
                    let one_of = alternatives
                        .iter()
                        .map(|alt| json!({"$ref": alt.as_str()}))
                        .collect();
                    map.insert("oneOf".to_string(), Value::Array(one_of));
                    return;
                }
            }
            for (key, child) in map.iter_mut() {
                match key.as_str() {
                    EXAMPLES_KEY | DISCRIMINATOR_MAP => {}
                    "allOf" | "oneOf" | "anyOf" => rewrite_references(child, rewrites, true),
                    _ => rewrite_references(child, rewrites, false),
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                rewrite_references(item, rewrites, in_set);
            }
        }
        _ => {}
    }
}
