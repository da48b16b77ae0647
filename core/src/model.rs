#![deny(missing_docs)]

//! # Resolved Model
//!
//! Tagged definitions compiled from a resolved document. The generator
//! matches on [`ResolvedDefinition`] instead of probing raw JSON.

use crate::pointer::DefRef;
use derive_more::Display;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

/// Shape tag of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DefinitionTag {
    /// Object with named properties.
    #[display("object")]
    Object,
    /// Array with an item schema.
    #[display("array")]
    Array,
    /// Any scalar (or untyped) schema.
    #[display("primitive")]
    Primitive,
}

/// A compiled schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedDefinition {
    /// See [`ObjectDefinition`].
    Object(ObjectDefinition),
    /// See [`ArrayDefinition`].
    Array(ArrayDefinition),
    /// See [`PrimitiveDefinition`].
    Primitive(PrimitiveDefinition),
}

impl ResolvedDefinition {
    /// The shape tag.
    pub fn tag(&self) -> DefinitionTag {
        match self {
            ResolvedDefinition::Object(_) => DefinitionTag::Object,
            ResolvedDefinition::Array(_) => DefinitionTag::Array,
            ResolvedDefinition::Primitive(_) => DefinitionTag::Primitive,
        }
    }

    /// The object body, if this is an object.
    pub fn as_object(&self) -> Option<&ObjectDefinition> {
        match self {
            ResolvedDefinition::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

/// A property of an object definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Compiled schema of the value.
    pub schema: DefRef,
    /// Location of the property node itself.
    pub site: DefRef,
    /// `readOnly: true` on the property.
    pub read_only: bool,
}

/// Additional-properties setting of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdditionalProperties {
    /// `additionalProperties: true`.
    Any,
    /// `additionalProperties: {schema}`.
    Schema(DefRef),
}

/// Discriminator of a polymorphic base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    /// Name of the discriminator property.
    pub property: String,
    /// Wire value -> subtype definition, in document order.
    pub mapping: IndexMap<String, DefRef>,
}

/// Compiled object schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectDefinition {
    /// Properties in declaration order (parents' first after flattening).
    pub properties: IndexMap<String, Property>,
    /// Required property names.
    pub required: IndexSet<String>,
    /// `None` when additional properties are disallowed or unspecified.
    pub additional_properties: Option<AdditionalProperties>,
    /// Present on discriminator-bearing definitions.
    pub discriminator: Option<Discriminator>,
}

/// Compiled array schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayDefinition {
    /// Item schema; `None` for an array without `items`.
    pub items: Option<DefRef>,
    /// `minItems`.
    pub min_items: Option<u64>,
    /// `maxItems`.
    pub max_items: Option<u64>,
}

/// Compiled scalar schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveDefinition {
    /// `type`, if declared.
    pub schema_type: Option<String>,
    /// `format`, if declared.
    pub format: Option<String>,
    /// `enum` values in order.
    pub enumeration: Vec<Value>,
    /// `default`.
    pub default: Option<Value>,
    /// `example`.
    pub example: Option<Value>,
    /// Validation keywords (`minimum`, `maxLength`, `pattern`, ...).
    pub constraints: Map<String, Value>,
}

impl PrimitiveDefinition {
    /// Numeric constraint by keyword.
    pub fn constraint_f64(&self, key: &str) -> Option<f64> {
        self.constraints.get(key).and_then(Value::as_f64)
    }

    /// Non-negative integer constraint by keyword.
    pub fn constraint_u64(&self, key: &str) -> Option<u64> {
        self.constraints.get(key).and_then(Value::as_u64)
    }
}

/// An operation of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRef {
    /// Path template.
    pub path: String,
    /// Lower-case HTTP method.
    pub method: String,
    /// `operationId`, or a name derived from method and path.
    pub operation_id: String,
    /// Location of the operation node.
    pub site: DefRef,
    /// `x-ms-long-running-operation: true`.
    pub long_running: bool,
    /// `x-ms-long-running-operation-options.final-state-via`, lower-cased.
    pub final_state_via: Option<String>,
}

/// A parameter in effect for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRef {
    /// Wire name.
    pub name: String,
    /// `in` (`path`, `query`, `header`, `body`, `formData`).
    pub location: String,
    /// `required: true`.
    pub required: bool,
    /// Location of the parameter node (after following `$ref`).
    pub site: DefRef,
    /// Compiled value schema: the body schema, or the parameter itself.
    pub schema: DefRef,
}

/// A declared response of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRef {
    /// Status code key (`200`, `default`, ...).
    pub status: String,
    /// Location of the response node (after following `$ref`).
    pub site: DefRef,
    /// Compiled body schema, if any.
    pub body: Option<DefRef>,
    /// Compiled header schemas by name.
    pub headers: IndexMap<String, DefRef>,
}
