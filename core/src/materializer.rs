#![deny(missing_docs)]

//! # Materializer
//!
//! Turns a cached fragment into the concrete JSON for one request or
//! response slot. A [`RuleValidator`] can veto whole subtrees; every
//! predicate allows by default.

use crate::cache::{CacheItem, CacheValue, Trunk};
use crate::document::ResolvedDocument;
use crate::model::{AdditionalProperties, ObjectDefinition, ResolvedDefinition};
use crate::pointer::DefRef;
use serde_json::{Map, Value};

/// Inclusion policy consulted during generation and materialization.
///
/// Each predicate receives the raw schema node in question.
pub trait RuleValidator {
    /// Whether a parameter is generated.
    fn on_parameter(&self, _schema: &Value) -> bool {
        true
    }

    /// Whether a response header is generated.
    fn on_response_header(&self, _schema: &Value) -> bool {
        true
    }

    /// Whether a response body is generated.
    fn on_response_body(&self, _schema: &Value) -> bool {
        true
    }

    /// Whether a schema (and everything under it) is emitted.
    fn on_schema(&self, _schema: &Value) -> bool {
        true
    }
}

/// Allows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl RuleValidator for AllowAll {}

/// Walks cached fragments into plain JSON.
pub struct Materializer<'a> {
    document: &'a ResolvedDocument,
    validator: &'a dyn RuleValidator,
    minimal: bool,
}

impl<'a> Materializer<'a> {
    /// Creates a materializer emitting every generated property.
    pub fn new(document: &'a ResolvedDocument, validator: &'a dyn RuleValidator) -> Self {
        Self {
            document,
            validator,
            minimal: false,
        }
    }

    /// Keeps only required properties when `minimal` is set.
    pub fn minimal(mut self, minimal: bool) -> Self {
        self.minimal = minimal;
        self
    }

    /// The JSON for `item`, generated against `schema`. `None` when the
    /// validator suppresses the schema.
    pub fn materialize(&self, item: &CacheItem, is_request: bool, schema: &DefRef) -> Option<Value> {
        if let Some(node) = self.document.node(schema) {
            if !self.validator.on_schema(node) {
                return None;
            }
        }
        let definition = self.document.definition(schema);

        match &item.value {
            CacheValue::Leaf(value) => Some(value.clone()),
            CacheValue::Trunk(Trunk::Keyed(members)) => {
                let object = definition
                    .and_then(ResolvedDefinition::as_object)
                    .map(|obj| self.concrete(obj, members));
                let mut out = Map::new();
                for (name, child) in members {
                    let Some(child) = child else {
                        continue;
                    };
                    if self.minimal && !item.meta.required.contains(name) {
                        continue;
                    }
                    let value = match object.and_then(|o| o.properties.get(name)) {
                        Some(prop) => {
                            if is_request && prop.read_only {
                                continue;
                            }
                            if let Some(site) = self.document.node(&prop.site) {
                                if !self.validator.on_schema(site) {
                                    continue;
                                }
                            }
                            self.materialize(child, is_request, &prop.schema)
                        }
                        None => match object.and_then(|o| o.additional_properties.as_ref()) {
                            Some(AdditionalProperties::Schema(extra)) => {
                                self.materialize(child, is_request, extra)
                            }
                            _ => Some(child.to_value()),
                        },
                    };
                    if let Some(value) = value {
                        out.insert(name.clone(), value);
                    }
                }
                Some(Value::Object(out))
            }
            CacheValue::Trunk(Trunk::Ordered(items)) => {
                let item_schema = match definition {
                    Some(ResolvedDefinition::Array(arr)) => arr.items.as_ref(),
                    _ => None,
                };
                let values = items
                    .iter()
                    .filter_map(|child| match item_schema {
                        Some(schema) => self.materialize(child, is_request, schema),
                        None => Some(child.to_value()),
                    })
                    .collect();
                Some(Value::Array(values))
            }
        }
    }

    /// The subtype a polymorphic fragment was generated from, found through
    /// its discriminator value; the object itself otherwise.
    fn concrete<'d>(
        &'d self,
        object: &'d ObjectDefinition,
        members: &indexmap::IndexMap<String, Option<std::rc::Rc<CacheItem>>>,
    ) -> &'d ObjectDefinition {
        let Some(disc) = &object.discriminator else {
            return object;
        };
        let wire = members
            .get(&disc.property)
            .and_then(Option::as_ref)
            .and_then(|item| match &item.value {
                CacheValue::Leaf(Value::String(s)) => Some(s.as_str()),
                _ => None,
            });
        wire.and_then(|w| disc.mapping.get(w))
            .and_then(|target| self.document.definition(target))
            .and_then(ResolvedDefinition::as_object)
            .unwrap_or(object)
    }
}
