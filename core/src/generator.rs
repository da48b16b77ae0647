#![deny(missing_docs)]

//! # Example Generator
//!
//! Depth-first walker turning a compiled definition (plus an optional seed
//! example) into a cached fragment.
//!
//! - Caller-supplied examples in the payload cache win over mocks.
//! - Each type is synthesized at most once per cache pair; later occurrences
//!   reuse the same fragment.
//! - A type already on the current descent path yields `None` (the field is
//!   kept, its value omitted). That outcome is never cached.
//! - Polymorphic bases delegate to one deterministically chosen subtype.
//!
//! Problems with individual subtrees are logged and collected, never
//! returned as errors.

use crate::cache::{CacheItem, CacheMeta, MockCache, PayloadCache};
use crate::document::ResolvedDocument;
use crate::error::GenerateError;
use crate::model::{
    AdditionalProperties, DefinitionTag, Discriminator, ObjectDefinition, PrimitiveDefinition,
    Property, ResolvedDefinition,
};
use crate::pointer::DefRef;
use crate::synthesizer::{ValueSynthesizer, MAX_GENERATED_ITEMS};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, warn};

/// Discriminator value fixed by the call that selected a subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscriminatorPin {
    /// Discriminator property name.
    pub property: String,
    /// Selected wire value.
    pub value: String,
}

/// Generator over one resolved document and one cache pair.
pub struct ExampleGenerator<'a, S: ValueSynthesizer + ?Sized> {
    document: &'a ResolvedDocument,
    payload: &'a PayloadCache,
    mock: &'a mut MockCache,
    synthesizer: &'a mut S,
    delegating: HashSet<DefRef>,
    issues: Vec<GenerateError>,
}

impl<'a, S: ValueSynthesizer + ?Sized> ExampleGenerator<'a, S> {
    /// Creates a generator writing synthesized fragments into `mock`.
    pub fn new(
        document: &'a ResolvedDocument,
        payload: &'a PayloadCache,
        mock: &'a mut MockCache,
        synthesizer: &'a mut S,
    ) -> Self {
        Self {
            document,
            payload,
            mock,
            synthesizer,
            delegating: HashSet::new(),
            issues: Vec::new(),
        }
    }

    /// Problems reported so far.
    pub fn issues(&self) -> &[GenerateError] {
        &self.issues
    }

    /// Consumes the generator, returning the reported problems.
    pub fn into_issues(self) -> Vec<GenerateError> {
        self.issues
    }

    /// Generates (or reuses) the fragment for `def_ref`.
    ///
    /// `visited` holds the types on the current descent path and is restored
    /// before returning. `pinned` forces the discriminator property of this
    /// object to a constant.
    pub fn generate(
        &mut self,
        name: &str,
        def_ref: &DefRef,
        seed: Option<&Value>,
        visited: &mut HashSet<DefRef>,
        is_request: bool,
        pinned: Option<&DiscriminatorPin>,
    ) -> Option<Rc<CacheItem>> {
        let document = self.document;
        let key = document.canonical(def_ref);
        if visited.contains(&key) {
            debug!(def_ref = %key, "cycle broken");
            return None;
        }
        if let Some(item) = self.payload.get(&key) {
            return Some(item);
        }
        if let Some(item) = self.mock.get(&key) {
            debug!(def_ref = %key, "mock cache hit");
            return Some(item);
        }

        let Some(definition) = document.definition(&key) else {
            self.report(GenerateError::InvalidSchema {
                def_ref: key,
                reason: "no compiled definition".to_string(),
            });
            return None;
        };
        debug!(def_ref = %key, name, is_request, tag = %definition.tag(), "generating");

        visited.insert(key.clone());
        let item = match definition {
            ResolvedDefinition::Object(obj) => {
                let merged = self.merged_properties(&key, obj);
                if let Some((disc, prop)) = self.delegation_target(&key, obj, &merged, pinned) {
                    visited.remove(&key);
                    return self.select_subtype(name, &key, disc, prop, seed, is_request);
                }
                self.object(name, &key, obj, &merged, seed, visited, is_request, pinned)
            }
            ResolvedDefinition::Array(arr) => {
                let first = seed.and_then(Value::as_array).and_then(|a| a.first());
                let template = arr
                    .items
                    .as_ref()
                    .and_then(|items| self.generate(name, items, first, visited, is_request, None));
                if arr.min_items.is_some_and(|min| min > MAX_GENERATED_ITEMS) {
                    self.report(GenerateError::InvalidSchema {
                        def_ref: key.clone(),
                        reason: format!("minItems exceeds the generation limit of {}", MAX_GENERATED_ITEMS),
                    });
                }
                let items = match template {
                    Some(template) => self.synthesizer.fill_array(arr, template),
                    None => Vec::new(),
                };
                Some(CacheItem::ordered(items, mocked(DefinitionTag::Array, IndexSet::new())))
            }
            ResolvedDefinition::Primitive(prim) => self.primitive(name, &key, prim, seed),
        };
        visited.remove(&key);

        let item = item?;
        Some(self.mock.insert(key, Rc::new(item)))
    }

    fn merged_properties(&self, key: &DefRef, obj: &ObjectDefinition) -> IndexMap<String, Property> {
        let mut merged = IndexMap::new();
        for parent in self.document.parents(key) {
            if let Some(parent) = self.document.definition(parent).and_then(|d| d.as_object()) {
                for (name, prop) in &parent.properties {
                    merged.insert(name.clone(), prop.clone());
                }
            }
        }
        for (name, prop) in &obj.properties {
            merged.insert(name.clone(), prop.clone());
        }
        merged
    }

    fn merged_required(&self, key: &DefRef, obj: &ObjectDefinition) -> IndexSet<String> {
        let mut required = obj.required.clone();
        for parent in self.document.parents(key) {
            if let Some(parent) = self.document.definition(parent).and_then(|d| d.as_object()) {
                required.extend(parent.required.iter().cloned());
            }
        }
        required
    }

    fn delegation_target<'o>(
        &self,
        key: &DefRef,
        obj: &'o ObjectDefinition,
        merged: &IndexMap<String, Property>,
        pinned: Option<&DiscriminatorPin>,
    ) -> Option<(&'o Discriminator, Property)> {
        if pinned.is_some() || self.delegating.contains(key) {
            return None;
        }
        let disc = obj.discriminator.as_ref()?;
        if disc.mapping.is_empty() {
            return None;
        }
        let prop = merged.get(&disc.property)?.clone();
        Some((disc, prop))
    }

    fn select_subtype(
        &mut self,
        name: &str,
        key: &DefRef,
        disc: &Discriminator,
        prop: Property,
        seed: Option<&Value>,
        is_request: bool,
    ) -> Option<Rc<CacheItem>> {
        let declared = match self.document.definition(&prop.schema) {
            Some(ResolvedDefinition::Primitive(p)) => {
                p.enumeration.first().and_then(Value::as_str).map(str::to_string)
            }
            _ => None,
        };
        let value = declared.or_else(|| disc.mapping.keys().next().cloned())?;

        let Some(target) = disc.mapping.get(&value) else {
            self.report(GenerateError::DiscriminatorSubtypeMissing {
                def_ref: key.clone(),
                value,
            });
            return seed.map(|s| {
                Rc::new(CacheItem::leaf(
                    s.clone(),
                    CacheMeta {
                        is_mocked: false,
                        required: IndexSet::new(),
                        tag: DefinitionTag::Object,
                    },
                ))
            });
        };
        debug!(def_ref = %key, subtype = %target, value = %value, "discriminator selected");

        let pin = DiscriminatorPin {
            property: disc.property.clone(),
            value,
        };
        self.delegating.insert(key.clone());
        let mut fresh = HashSet::new();
        let item = self.generate(name, target, seed, &mut fresh, is_request, Some(&pin));
        self.delegating.remove(key);
        Some(self.mock.insert(key.clone(), item?))
    }

    #[allow(clippy::too_many_arguments)]
    fn object(
        &mut self,
        name: &str,
        key: &DefRef,
        obj: &ObjectDefinition,
        merged: &IndexMap<String, Property>,
        seed: Option<&Value>,
        visited: &mut HashSet<DefRef>,
        is_request: bool,
        pinned: Option<&DiscriminatorPin>,
    ) -> Option<CacheItem> {
        let mut members = IndexMap::new();
        for (prop_name, prop) in merged {
            if let Some(pin) = pinned.filter(|p| p.property == *prop_name) {
                let constant = CacheItem::leaf(
                    Value::String(pin.value.clone()),
                    mocked(DefinitionTag::Primitive, IndexSet::new()),
                );
                members.insert(prop_name.clone(), Some(Rc::new(constant)));
                continue;
            }
            let child_seed = seed.and_then(|s| s.get(prop_name));
            let child = self.generate(prop_name, &prop.schema, child_seed, visited, is_request, None);
            members.insert(prop_name.clone(), child);
        }

        if let Some(additional) = &obj.additional_properties {
            let extras: Vec<(&String, &Value)> = seed
                .and_then(Value::as_object)
                .map(|m| m.iter().filter(|(k, _)| !merged.contains_key(*k)).collect())
                .unwrap_or_default();
            if extras.is_empty() {
                let extra_key = self.synthesizer.property_key(name);
                if merged.contains_key(&extra_key) {
                    self.report(GenerateError::AdditionalPropertiesCollision {
                        def_ref: key.clone(),
                        key: extra_key,
                    });
                } else {
                    let value = self.additional_value(&extra_key, key, additional, None, visited, is_request);
                    members.insert(extra_key, value);
                }
            } else {
                for (extra_key, value) in extras {
                    let value =
                        self.additional_value(extra_key, key, additional, Some(value), visited, is_request);
                    members.insert(extra_key.clone(), value);
                }
            }
        }

        Some(CacheItem::keyed(
            members,
            mocked(DefinitionTag::Object, self.merged_required(key, obj)),
        ))
    }

    fn additional_value(
        &mut self,
        extra_key: &str,
        owner: &DefRef,
        additional: &AdditionalProperties,
        seed: Option<&Value>,
        visited: &mut HashSet<DefRef>,
        is_request: bool,
    ) -> Option<Rc<CacheItem>> {
        match additional {
            AdditionalProperties::Schema(schema) => {
                self.generate(extra_key, schema, seed, visited, is_request, None)
            }
            AdditionalProperties::Any => {
                let any = PrimitiveDefinition {
                    schema_type: Some("string".to_string()),
                    ..Default::default()
                };
                self.primitive(extra_key, owner, &any, seed).map(Rc::new)
            }
        }
    }

    fn primitive(
        &mut self,
        name: &str,
        key: &DefRef,
        prim: &PrimitiveDefinition,
        seed: Option<&Value>,
    ) -> Option<CacheItem> {
        match self.synthesizer.synthesize(prim, name, seed) {
            Ok(value) => Some(CacheItem::leaf(
                value,
                mocked(DefinitionTag::Primitive, IndexSet::new()),
            )),
            Err(err) => {
                self.report(GenerateError::InvalidSchema {
                    def_ref: key.clone(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    fn report(&mut self, issue: GenerateError) {
        warn!(%issue, "example generation issue");
        self.issues.push(issue);
    }
}

fn mocked(tag: DefinitionTag, required: IndexSet<String>) -> CacheMeta {
    CacheMeta {
        is_mocked: true,
        required,
        tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePair;
    use crate::resolver::resolve_in_memory;
    use crate::synthesizer::{DefaultSynthesizer, SynthesisError};
    use serde_json::json;

    fn resolve(yaml: &str) -> ResolvedDocument {
        resolve_in_memory(serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    fn run(
        doc: &ResolvedDocument,
        caches: &mut CachePair,
        name: &str,
        seed: Option<&Value>,
    ) -> (Option<Rc<CacheItem>>, Vec<GenerateError>) {
        let mut synth = DefaultSynthesizer::new(42);
        let (payload, mock) = caches.split();
        let mut generator = ExampleGenerator::new(doc, payload, mock, &mut synth);
        let mut visited = HashSet::new();
        let item = generator.generate(
            name,
            &DefRef::definition(name),
            seed,
            &mut visited,
            false,
            None,
        );
        assert!(visited.is_empty());
        (item, generator.into_issues())
    }

    #[test]
    fn test_self_reference_terminates() {
        let doc = resolve(
            r##"
definitions:
  Node:
    type: object
    properties:
      value: {type: integer}
      next: {$ref: "#/definitions/Node"}
"##,
        );
        let mut caches = CachePair::new();
        let (item, issues) = run(&doc, &mut caches, "Node", None);
        let item = item.unwrap();
        match &item.value {
            crate::cache::CacheValue::Trunk(crate::cache::Trunk::Keyed(members)) => {
                assert!(members.contains_key("next"));
                assert!(members["next"].is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(issues.is_empty());
    }

    #[test]
    fn test_seed_values_are_used() {
        let doc = resolve(
            r##"
definitions:
  Pet:
    type: object
    properties:
      name: {type: string}
      tags: {type: array, items: {type: string}}
"##,
        );
        let mut caches = CachePair::new();
        let seed = json!({"name": "rex", "tags": ["a", "b"]});
        let (item, _) = run(&doc, &mut caches, "Pet", Some(&seed));
        let value = item.unwrap().to_value();
        assert_eq!(value["name"], json!("rex"));
        assert_eq!(value["tags"], json!(["a"]));
    }

    #[test]
    fn test_payload_cache_wins() {
        let doc = resolve(
            r##"
definitions:
  Pet:
    type: object
    properties:
      name: {type: string}
"##,
        );
        let mut caches = CachePair::new();
        caches
            .payload
            .seed(&doc, &DefRef::definition("Pet"), &json!({"name": "real"}));
        let (item, _) = run(&doc, &mut caches, "Pet", None);
        let item = item.unwrap();
        assert!(!item.meta.is_mocked);
        assert_eq!(item.to_value(), json!({"name": "real"}));
        assert!(caches.mock.is_empty());
    }

    #[test]
    fn test_additional_properties_get_one_key() {
        let doc = resolve(
            r##"
definitions:
  Tags:
    type: object
    additionalProperties: {type: string}
"##,
        );
        let mut caches = CachePair::new();
        let (item, issues) = run(&doc, &mut caches, "Tags", None);
        let value = item.unwrap().to_value();
        assert_eq!(value.as_object().unwrap().len(), 1);
        assert!(issues.is_empty());
    }

    struct Colliding;

    impl ValueSynthesizer for Colliding {
        fn synthesize(
            &mut self,
            _schema: &PrimitiveDefinition,
            _name: &str,
            seed: Option<&Value>,
        ) -> Result<Value, SynthesisError> {
            Ok(seed.cloned().unwrap_or(json!("v")))
        }

        fn property_key(&mut self, _owner: &str) -> String {
            "name".to_string()
        }
    }

    #[test]
    fn test_additional_property_collision_is_reported() {
        let doc = resolve(
            r##"
definitions:
  Bag:
    type: object
    properties:
      name: {type: string}
    additionalProperties: true
"##,
        );
        let mut caches = CachePair::new();
        let mut synth = Colliding;
        let (payload, mock) = caches.split();
        let mut generator = ExampleGenerator::new(&doc, payload, mock, &mut synth);
        let item = generator
            .generate("Bag", &DefRef::definition("Bag"), None, &mut HashSet::new(), false, None)
            .unwrap();
        assert_eq!(item.to_value(), json!({"name": "v"}));
        assert!(matches!(
            generator.issues(),
            [GenerateError::AdditionalPropertiesCollision { key, .. }] if key == "name"
        ));
    }

    #[test]
    fn test_invalid_primitive_is_omitted() {
        let doc = resolve(
            r##"
definitions:
  Odd:
    type: object
    required: [weird, ok]
    properties:
      weird: {type: tuple}
      ok: {type: boolean}
"##,
        );
        let mut caches = CachePair::new();
        let (item, issues) = run(&doc, &mut caches, "Odd", None);
        let value = item.unwrap().to_value();
        assert!(value.get("weird").is_none());
        assert!(value["ok"].is_boolean());
        assert!(matches!(issues.as_slice(), [GenerateError::InvalidSchema { .. }]));
    }

    #[test]
    fn test_discriminator_pins_subtype_value() {
        let doc = resolve(
            r##"
definitions:
  Shape:
    type: object
    discriminator: shape
    required: [shape]
    properties:
      shape: {type: string, enum: [circle]}
  Circle:
    x-ms-discriminator-value: circle
    allOf: [{$ref: "#/definitions/Shape"}]
    properties:
      radius: {type: number}
"##,
        );
        let mut caches = CachePair::new();
        let (item, issues) = run(&doc, &mut caches, "Shape", None);
        let value = item.unwrap().to_value();
        assert_eq!(value["shape"], json!("circle"));
        assert!(value.get("radius").is_some());
        assert!(issues.is_empty());
        let shape = caches.mock.get(&DefRef::definition("Shape")).unwrap();
        let circle = caches.mock.get(&DefRef::definition("Circle")).unwrap();
        assert!(Rc::ptr_eq(&shape, &circle));
    }

    #[test]
    fn test_unmapped_discriminator_value_is_reported() {
        let doc = resolve(
            r##"
definitions:
  Shape:
    type: object
    discriminator: shape
    required: [shape]
    properties:
      shape: {type: string, enum: [square, circle]}
  Circle:
    x-ms-discriminator-value: circle
    allOf: [{$ref: "#/definitions/Shape"}]
"##,
        );
        let mut caches = CachePair::new();
        let (item, issues) = run(&doc, &mut caches, "Shape", None);
        assert!(item.is_none());
        assert!(matches!(
            issues.as_slice(),
            [GenerateError::DiscriminatorSubtypeMissing { value, .. }] if value == "square"
        ));

        let seed = json!({"shape": "square", "side": 2});
        let (item, _) = run(&doc, &mut caches, "Shape", Some(&seed));
        let item = item.unwrap();
        assert!(!item.meta.is_mocked);
        assert_eq!(item.to_value(), seed);
        assert!(caches.mock.get(&DefRef::definition("Shape")).is_none());
    }

    #[test]
    fn test_out_of_range_number_is_reported_not_fatal() {
        let doc = resolve(
            r##"
definitions:
  Limits:
    type: object
    properties:
      edge: {type: integer, minimum: 9223372036854775807, exclusiveMinimum: true}
      wide: {type: number, minimum: -1e308, maximum: 1e308}
"##,
        );
        let mut caches = CachePair::new();
        let (item, issues) = run(&doc, &mut caches, "Limits", None);
        let value = item.unwrap().to_value();
        assert!(value.get("edge").is_none());
        assert!(value["wide"].as_f64().unwrap().is_finite());
        assert!(matches!(issues.as_slice(), [GenerateError::InvalidSchema { .. }]));
    }

    #[test]
    fn test_oversized_array_is_capped_and_reported() {
        let doc = resolve(
            r##"
definitions:
  Many:
    type: array
    minItems: 4000000000
    items: {type: boolean}
"##,
        );
        let mut caches = CachePair::new();
        let (item, issues) = run(&doc, &mut caches, "Many", None);
        let value = item.unwrap().to_value();
        assert_eq!(value.as_array().unwrap().len() as u64, MAX_GENERATED_ITEMS);
        assert!(matches!(
            issues.as_slice(),
            [GenerateError::InvalidSchema { reason, .. }] if reason.contains("minItems")
        ));
    }

    #[test]
    fn test_mutual_polymorphic_reference_terminates() {
        let doc = resolve(
            r##"
definitions:
  Animal:
    type: object
    discriminator: kind
    required: [kind]
    properties:
      kind: {type: string}
  Cat:
    allOf: [{$ref: "#/definitions/Animal"}]
    required: [friend]
    properties:
      friend: {$ref: "#/definitions/Animal"}
"##,
        );
        let mut caches = CachePair::new();
        let (item, _) = run(&doc, &mut caches, "Cat", None);
        let value = item.unwrap().to_value();
        assert_eq!(value["kind"], json!("Cat"));
        assert!(value["friend"]["kind"].is_string());
    }
}
