#![deny(missing_docs)]

//! # Resolved Document
//!
//! The output of the resolver: the normalized JSON plus a flat arena of
//! compiled definitions keyed by [`DefRef`].
//!
//! Every schema location the generator can reach is compiled once, here:
//! definitions, shared and per-operation parameters, response bodies and
//! headers, and the inline schemas nested under them. A location that is a
//! bare `$ref` (or an alternative set) is recorded as an alias of the
//! location it stands for.

use crate::model::{
    AdditionalProperties, ArrayDefinition, Discriminator, ObjectDefinition, OperationRef,
    ParameterRef, PrimitiveDefinition, Property, ResolvedDefinition, ResponseRef,
};
use crate::pointer::{ref_of, DefRef};
use crate::polymorphic::DISCRIMINATOR_VALUE;
use crate::resolver::composition::CompositionParents;
use crate::resolver::hoisting::sanitize_name;
use crate::resolver::normalization::is_null_schema;
use crate::resolver::polymorphism::DISCRIMINATOR_MAP;
use crate::resolver::HTTP_METHODS;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

const MAX_ALIAS_HOPS: usize = 32;

const CONSTRAINT_KEYS: [&str; 9] = [
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minLength",
    "maxLength",
    "pattern",
    "uniqueItems",
];

/// A fully resolved document.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    document: Value,
    definitions: IndexMap<DefRef, ResolvedDefinition>,
    aliases: HashMap<DefRef, DefRef>,
    parents: CompositionParents,
}

impl ResolvedDocument {
    /// Compiles the arena for an already normalized document.
    pub(crate) fn compile(document: Value, parents: CompositionParents) -> Self {
        let mut compiler = Compiler {
            doc: &document,
            definitions: IndexMap::new(),
            aliases: HashMap::new(),
            pending: Vec::new(),
        };
        compiler.walk_root();
        compiler.drain_pending();
        let Compiler {
            definitions,
            aliases,
            ..
        } = compiler;
        debug!(
            definitions = definitions.len(),
            aliases = aliases.len(),
            "compiled resolved document"
        );
        Self {
            document,
            definitions,
            aliases,
            parents,
        }
    }

    /// The normalized JSON.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Consumes the document, returning the normalized JSON.
    pub fn into_document(self) -> Value {
        self.document
    }

    /// Raw node at a location.
    pub fn node(&self, def_ref: &DefRef) -> Option<&Value> {
        def_ref.lookup(&self.document)
    }

    /// Follows aliases to the compiled location.
    pub fn canonical(&self, def_ref: &DefRef) -> DefRef {
        let mut current = def_ref;
        for _ in 0..MAX_ALIAS_HOPS {
            match self.aliases.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    /// The compiled definition at (or aliased by) `def_ref`.
    pub fn definition(&self, def_ref: &DefRef) -> Option<&ResolvedDefinition> {
        self.definitions.get(&self.canonical(def_ref))
    }

    /// Every compiled definition, in compilation order.
    pub fn definitions(&self) -> impl Iterator<Item = (&DefRef, &ResolvedDefinition)> {
        self.definitions.iter()
    }

    /// Composition parents of a definition, as recorded before cleanup.
    pub fn parents(&self, def_ref: &DefRef) -> &[DefRef] {
        self.parents
            .get(def_ref)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `info.version`.
    pub fn api_version(&self) -> Option<&str> {
        self.document
            .get("info")
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
    }

    /// Every operation under `paths`, in document order.
    pub fn operations(&self) -> Vec<OperationRef> {
        let Some(paths) = self.document.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            for (method, op) in item {
                if !HTTP_METHODS.contains(&method.as_str()) || !op.is_object() {
                    continue;
                }
                let final_state_via = op
                    .get("x-ms-long-running-operation-options")
                    .and_then(|o| o.get("final-state-via"))
                    .and_then(Value::as_str)
                    .map(str::to_ascii_lowercase);
                out.push(OperationRef {
                    path: path.clone(),
                    method: method.clone(),
                    operation_id: operation_id(path, method, op),
                    site: DefRef::root().child("paths").child(path).child(method),
                    long_running: op
                        .get("x-ms-long-running-operation")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    final_state_via,
                });
            }
        }
        out
    }

    /// Looks an operation up by id (case-insensitive).
    pub fn operation(&self, operation_id: &str) -> Option<OperationRef> {
        self.operations()
            .into_iter()
            .find(|op| op.operation_id.eq_ignore_ascii_case(operation_id))
    }

    /// Path-level and operation-level parameters; the operation's win on an
    /// equal `name` and `in`.
    pub fn parameters(&self, op: &OperationRef) -> Vec<ParameterRef> {
        let path_site = DefRef::root().child("paths").child(&op.path);
        let mut merged: IndexMap<(String, String), ParameterRef> = IndexMap::new();
        for owner in [path_site, op.site.clone()] {
            let list_site = owner.child("parameters");
            let Some(list) = self.node(&list_site).and_then(Value::as_array) else {
                continue;
            };
            for (idx, entry) in list.iter().enumerate() {
                let site = match ref_of(entry) {
                    Some(target) => DefRef::from_fragment(target),
                    None => list_site.index(idx),
                };
                let Some(param) = self.node(&site) else {
                    continue;
                };
                let name = str_field(param, "name").unwrap_or_default().to_string();
                let location = str_field(param, "in").unwrap_or_default().to_string();
                let schema = if location == "body" {
                    self.canonical(&site.child("schema"))
                } else {
                    self.canonical(&site)
                };
                merged.insert(
                    (name.clone(), location.clone()),
                    ParameterRef {
                        name,
                        location,
                        required: param.get("required").and_then(Value::as_bool) == Some(true),
                        site,
                        schema,
                    },
                );
            }
        }
        merged.into_values().collect()
    }

    /// Declared responses of an operation.
    pub fn responses(&self, op: &OperationRef) -> Vec<ResponseRef> {
        let responses_site = op.site.child("responses");
        let Some(responses) = self.node(&responses_site).and_then(Value::as_object) else {
            return Vec::new();
        };
        responses
            .iter()
            .map(|(status, response)| {
                let site = match ref_of(response) {
                    Some(target) => DefRef::from_fragment(target),
                    None => responses_site.child(status),
                };
                let node = self.node(&site);
                let body = node
                    .and_then(|r| r.get("schema"))
                    .map(|_| self.canonical(&site.child("schema")));
                let headers = node
                    .and_then(|r| r.get("headers"))
                    .and_then(Value::as_object)
                    .map(|headers| {
                        headers
                            .keys()
                            .map(|h| {
                                (h.clone(), self.canonical(&site.child("headers").child(h)))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                ResponseRef {
                    status: status.clone(),
                    site,
                    body,
                    headers,
                }
            })
            .collect()
    }
}

/// `operationId`, or a sanitized `{method}_{path}` when absent.
pub(crate) fn operation_id(path: &str, method: &str, op: &Value) -> String {
    match op.get("operationId").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => sanitize_name(&format!("{} {}", method, path)),
    }
}

fn str_field<'v>(node: &'v Value, key: &str) -> Option<&'v str> {
    node.get(key).and_then(Value::as_str)
}

struct Compiler<'d> {
    doc: &'d Value,
    definitions: IndexMap<DefRef, ResolvedDefinition>,
    aliases: HashMap<DefRef, DefRef>,
    pending: Vec<DefRef>,
}

impl<'d> Compiler<'d> {
    fn walk_root(&mut self) {
        let doc = self.doc;
        let root = DefRef::root();

        if let Some(defs) = doc.get("definitions").and_then(Value::as_object) {
            for (name, node) in defs {
                self.root_schema(DefRef::definition(name), node);
            }
        }
        if let Some(params) = doc.get("parameters").and_then(Value::as_object) {
            let section = root.child("parameters");
            for (name, node) in params {
                self.parameter(section.child(name), node);
            }
        }
        if let Some(responses) = doc.get("responses").and_then(Value::as_object) {
            let section = root.child("responses");
            for (name, node) in responses {
                self.response(section.child(name), node);
            }
        }
        if let Some(paths) = doc.get("paths").and_then(Value::as_object) {
            let section = root.child("paths");
            for (path, item) in paths {
                let Some(item) = item.as_object() else {
                    continue;
                };
                let item_site = section.child(path);
                for (key, node) in item {
                    if key == "parameters" {
                        self.parameter_list(item_site.child(key), node);
                    } else if HTTP_METHODS.contains(&key.as_str()) {
                        let op_site = item_site.child(key);
                        if let Some(params) = node.get("parameters") {
                            self.parameter_list(op_site.child("parameters"), params);
                        }
                        if let Some(responses) = node.get("responses").and_then(Value::as_object)
                        {
                            let responses_site = op_site.child("responses");
                            for (status, response) in responses {
                                self.response(responses_site.child(status), response);
                            }
                        }
                    }
                }
            }
        }
    }

    fn drain_pending(&mut self) {
        while let Some(target) = self.pending.pop() {
            if self.definitions.contains_key(&target) || self.aliases.contains_key(&target) {
                continue;
            }
            if let Some(node) = target.lookup(self.doc) {
                self.root_schema(target, node);
            }
        }
    }

    fn root_schema(&mut self, site: DefRef, node: &'d Value) {
        let id = self.schema_at(site.clone(), node);
        if id != site {
            self.aliases.insert(site, id);
        }
    }

    fn parameter_list(&mut self, site: DefRef, list: &'d Value) {
        let Some(list) = list.as_array() else {
            return;
        };
        for (idx, param) in list.iter().enumerate() {
            if ref_of(param).is_none() {
                self.parameter(site.index(idx), param);
            }
        }
    }

    fn parameter(&mut self, site: DefRef, param: &'d Value) {
        match param.get("schema") {
            Some(schema) if str_field(param, "in") == Some("body") => {
                self.root_schema(site.child("schema"), schema);
            }
            _ => self.root_schema(site, param),
        }
    }

    fn response(&mut self, site: DefRef, response: &'d Value) {
        if ref_of(response).is_some() {
            return;
        }
        if let Some(schema) = response.get("schema") {
            self.root_schema(site.child("schema"), schema);
        }
        if let Some(headers) = response.get("headers").and_then(Value::as_object) {
            let headers_site = site.child("headers");
            for (name, header) in headers {
                self.root_schema(headers_site.child(name), header);
            }
        }
    }

    /// Compiles `node` found at `site` and returns the location that holds
    /// its compiled definition.
    fn schema_at(&mut self, site: DefRef, node: &'d Value) -> DefRef {
        if let Some(target) = ref_of(node) {
            let target = DefRef::from_fragment(target);
            self.pending.push(target.clone());
            return target;
        }
        for keyword in ["oneOf", "anyOf"] {
            if let Some(alts) = node.get(keyword).and_then(Value::as_array) {
                if let Some(idx) = alts.iter().position(|a| !is_null_schema(a)) {
                    return self.schema_at(site.child(keyword).index(idx), &alts[idx]);
                }
            }
        }
        if let Some([only]) = node.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            return self.schema_at(site.child("allOf").index(0), only);
        }
        if self.definitions.contains_key(&site) {
            return site;
        }

        let compiled = match shape_of(node) {
            Shape::Object => ResolvedDefinition::Object(self.object(&site, node)),
            Shape::Array => ResolvedDefinition::Array(self.array(&site, node)),
            Shape::Primitive => ResolvedDefinition::Primitive(primitive(node)),
        };
        self.definitions.insert(site.clone(), compiled);
        site
    }

    fn object(&mut self, site: &DefRef, node: &'d Value) -> ObjectDefinition {
        let mut out = ObjectDefinition::default();

        if let Some(props) = node.get("properties").and_then(Value::as_object) {
            let props_site = site.child("properties");
            for (name, prop) in props {
                let prop_site = props_site.child(name);
                let schema = self.schema_at(prop_site.clone(), prop);
                out.properties.insert(
                    name.clone(),
                    Property {
                        schema,
                        site: prop_site,
                        read_only: is_read_only(prop),
                    },
                );
            }
        }

        out.required = node
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<IndexSet<_>>()
            })
            .unwrap_or_default();

        out.additional_properties = match node.get("additionalProperties") {
            Some(Value::Bool(true)) => Some(AdditionalProperties::Any),
            Some(schema @ Value::Object(_)) => Some(AdditionalProperties::Schema(
                self.schema_at(site.child("additionalProperties"), schema),
            )),
            _ => None,
        };

        if let Some(property) = str_field(node, "discriminator") {
            let mapping: IndexMap<String, DefRef> = match node
                .get(DISCRIMINATOR_MAP)
                .and_then(Value::as_object)
            {
                Some(map) if !map.is_empty() => map
                    .iter()
                    .filter_map(|(wire, target)| {
                        Some((wire.clone(), DefRef::from_fragment(target.as_str()?)))
                    })
                    .collect(),
                _ => {
                    let wire = str_field(node, DISCRIMINATOR_VALUE)
                        .map(str::to_string)
                        .or_else(|| site.last_segment())
                        .unwrap_or_default();
                    IndexMap::from([(wire, site.clone())])
                }
            };
            out.discriminator = Some(Discriminator {
                property: property.to_string(),
                mapping,
            });
        }
        out
    }

    fn array(&mut self, site: &DefRef, node: &'d Value) -> ArrayDefinition {
        ArrayDefinition {
            items: node
                .get("items")
                .map(|items| self.schema_at(site.child("items"), items)),
            min_items: node.get("minItems").and_then(Value::as_u64),
            max_items: node.get("maxItems").and_then(Value::as_u64),
        }
    }
}

enum Shape {
    Object,
    Array,
    Primitive,
}

fn shape_of(node: &Value) -> Shape {
    match str_field(node, "type") {
        Some("object") => Shape::Object,
        Some("array") => Shape::Array,
        Some(_) => Shape::Primitive,
        None if node.get("items").is_some() => Shape::Array,
        None if node.get("properties").is_some()
            || node.get("discriminator").is_some()
            || node.get("additionalProperties").is_some_and(Value::is_object) =>
        {
            Shape::Object
        }
        None => Shape::Primitive,
    }
}

fn primitive(node: &Value) -> PrimitiveDefinition {
    let constraints: Map<String, Value> = CONSTRAINT_KEYS
        .iter()
        .filter_map(|key| node.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect();
    PrimitiveDefinition {
        schema_type: str_field(node, "type").map(str::to_string),
        format: str_field(node, "format").map(str::to_string),
        enumeration: node
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        default: node.get("default").cloned(),
        example: node.get("example").cloned(),
        constraints,
    }
}

/// `readOnly` on the property or on the non-null member of its widened form.
fn is_read_only(prop: &Value) -> bool {
    if prop.get("readOnly").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    prop.get("oneOf")
        .and_then(Value::as_array)
        .and_then(|alts| alts.iter().find(|a| !is_null_schema(a)))
        .and_then(|a| a.get("readOnly"))
        .and_then(Value::as_bool)
        == Some(true)
}
