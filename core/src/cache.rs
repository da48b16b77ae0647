#![deny(missing_docs)]

//! # Cache Store
//!
//! Two keyed stores of generated fragments, both keyed by [`DefRef`]:
//!
//! - [`PayloadCache`] holds real examples supplied by the caller. It is
//!   seeded before generation and only read afterwards.
//! - [`MockCache`] holds synthesized fragments. Each key is written at most
//!   once; every later occurrence of the same type reuses the same item.
//!
//! Items are shared as `Rc<CacheItem>` and never mutated after insertion.

use crate::document::ResolvedDocument;
use crate::model::{DefinitionTag, ResolvedDefinition};
use crate::pointer::DefRef;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// Metadata carried by every cached fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMeta {
    /// True for synthesized fragments.
    pub is_mocked: bool,
    /// Required property names (own plus one level of parents').
    pub required: IndexSet<String>,
    /// Shape the fragment was built from.
    pub tag: DefinitionTag,
}

/// Children of a trunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Trunk {
    /// Object members. `None` marks a field whose value was omitted (e.g. a
    /// broken cycle); the key itself stays present.
    Keyed(IndexMap<String, Option<Rc<CacheItem>>>),
    /// Array elements.
    Ordered(Vec<Rc<CacheItem>>),
}

/// Leaf scalar or trunk collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// A complete JSON value.
    Leaf(Value),
    /// A collection of child items.
    Trunk(Trunk),
}

/// A cached example fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    /// The fragment.
    pub value: CacheValue,
    /// Its metadata.
    pub meta: CacheMeta,
}

impl CacheItem {
    /// A leaf item.
    pub fn leaf(value: Value, meta: CacheMeta) -> Self {
        Self {
            value: CacheValue::Leaf(value),
            meta,
        }
    }

    /// An object trunk.
    pub fn keyed(members: IndexMap<String, Option<Rc<CacheItem>>>, meta: CacheMeta) -> Self {
        Self {
            value: CacheValue::Trunk(Trunk::Keyed(members)),
            meta,
        }
    }

    /// An array trunk.
    pub fn ordered(items: Vec<Rc<CacheItem>>, meta: CacheMeta) -> Self {
        Self {
            value: CacheValue::Trunk(Trunk::Ordered(items)),
            meta,
        }
    }

    /// Plain JSON of the whole fragment, omitted members dropped.
    pub fn to_value(&self) -> Value {
        match &self.value {
            CacheValue::Leaf(v) => v.clone(),
            CacheValue::Trunk(Trunk::Keyed(members)) => Value::Object(
                members
                    .iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_ref()?.to_value())))
                    .collect(),
            ),
            CacheValue::Trunk(Trunk::Ordered(items)) => {
                Value::Array(items.iter().map(|i| i.to_value()).collect())
            }
        }
    }
}

/// Real examples supplied by the caller.
#[derive(Debug, Default)]
pub struct PayloadCache {
    items: IndexMap<DefRef, Rc<CacheItem>>,
}

impl PayloadCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The item stored for `def_ref`.
    pub fn get(&self, def_ref: &DefRef) -> Option<Rc<CacheItem>> {
        self.items.get(def_ref).cloned()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing has been seeded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records `example` for `def_ref` and for every type nested in it.
    ///
    /// The first example recorded for a key wins. Within one example the
    /// outermost occurrence of a type wins over nested ones.
    pub fn seed(&mut self, document: &ResolvedDocument, def_ref: &DefRef, example: &Value) {
        let mut in_progress = HashSet::new();
        self.seed_at(document, def_ref, example, &mut in_progress);
    }

    fn seed_at(
        &mut self,
        document: &ResolvedDocument,
        def_ref: &DefRef,
        example: &Value,
        in_progress: &mut HashSet<DefRef>,
    ) -> Option<Rc<CacheItem>> {
        let key = document.canonical(def_ref);
        let Some(definition) = document.definition(&key) else {
            return Some(Rc::new(CacheItem::leaf(
                example.clone(),
                real_meta(DefinitionTag::Primitive, IndexSet::new()),
            )));
        };
        let nested = !in_progress.insert(key.clone());

        let item = match (definition, example) {
            (ResolvedDefinition::Object(obj), Value::Object(members)) => {
                let mut out = IndexMap::new();
                for (name, value) in members {
                    let child = match obj.properties.get(name) {
                        Some(prop) => self.seed_at(document, &prop.schema, value, in_progress),
                        None => Some(Rc::new(CacheItem::leaf(
                            value.clone(),
                            real_meta(DefinitionTag::Primitive, IndexSet::new()),
                        ))),
                    };
                    out.insert(name.clone(), child);
                }
                CacheItem::keyed(out, real_meta(DefinitionTag::Object, obj.required.clone()))
            }
            (ResolvedDefinition::Array(arr), Value::Array(values)) => {
                let items = values
                    .iter()
                    .filter_map(|v| match &arr.items {
                        Some(items) => self.seed_at(document, items, v, in_progress),
                        None => Some(Rc::new(CacheItem::leaf(
                            v.clone(),
                            real_meta(DefinitionTag::Primitive, IndexSet::new()),
                        ))),
                    })
                    .collect();
                CacheItem::ordered(items, real_meta(DefinitionTag::Array, IndexSet::new()))
            }
            (def, value) => CacheItem::leaf(value.clone(), real_meta(def.tag(), IndexSet::new())),
        };

        let item = Rc::new(item);
        if !nested {
            in_progress.remove(&key);
            if !self.items.contains_key(&key) {
                debug!(def_ref = %key, "payload cache seeded");
                self.items.insert(key, item.clone());
            }
        }
        Some(item)
    }
}

fn real_meta(tag: DefinitionTag, required: IndexSet<String>) -> CacheMeta {
    CacheMeta {
        is_mocked: false,
        required,
        tag,
    }
}

/// Synthesized fragments, written once per key.
#[derive(Debug, Default)]
pub struct MockCache {
    items: IndexMap<DefRef, Rc<CacheItem>>,
}

impl MockCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The item stored for `def_ref`.
    pub fn get(&self, def_ref: &DefRef) -> Option<Rc<CacheItem>> {
        self.items.get(def_ref).cloned()
    }

    /// Stores `item` unless the key is taken; returns the stored instance.
    pub fn insert(&mut self, def_ref: DefRef, item: Rc<CacheItem>) -> Rc<CacheItem> {
        self.items.entry(def_ref).or_insert(item).clone()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing has been generated.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The payload and mock caches of one generation run.
#[derive(Debug, Default)]
pub struct CachePair {
    /// Caller-supplied examples.
    pub payload: PayloadCache,
    /// Generated fragments.
    pub mock: MockCache,
}

impl CachePair {
    /// Creates a pair of empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload first, then mock.
    pub fn lookup(&self, def_ref: &DefRef) -> Option<Rc<CacheItem>> {
        self.payload.get(def_ref).or_else(|| self.mock.get(def_ref))
    }

    /// Borrows the read-only payload cache and the writable mock cache.
    pub fn split(&mut self) -> (&PayloadCache, &mut MockCache) {
        (&self.payload, &mut self.mock)
    }
}
