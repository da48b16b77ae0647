#![deny(missing_docs)]

//! # Cross-File Inclusion
//!
//! Replaces references into other documents with local ones.
//!
//! A remote `{doc}#/{section}/{name}` target is copied into the local
//! `section` and the reference is rewritten to point at the copy. Each remote
//! location is copied at most once, however many places refer to it. After a
//! copy, definitions of the same remote document that compose from the copied
//! one are pulled in as well, so subtypes nobody references directly still
//! take part in polymorphism. Targets of any other shape are inlined.

use super::{malformed, Fetcher, PassError, EXAMPLES_KEY};
use crate::error::{ResolveError, UnresolvedRef};
use crate::pointer::{parse_reference, ref_of, resolve_document_url, DefRef, ReferenceKind};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

const MAX_INLINE_DEPTH: usize = 64;

/// Pass 3.
pub(crate) fn include_remote_references(
    doc: &mut Value,
    base: &Url,
    fetcher: &mut Fetcher<'_>,
) -> Result<(), PassError> {
    let mut inclusion = Inclusion::new(doc, base, fetcher);
    inclusion.rewrite(doc, 0)?;

    let mut idx = 0;
    while idx < inclusion.spliced.len() {
        let mut value = std::mem::take(&mut inclusion.spliced[idx].value);
        inclusion.rewrite(&mut value, 0)?;
        inclusion.spliced[idx].value = value;
        idx += 1;
    }

    let root = doc
        .as_object_mut()
        .ok_or_else(|| malformed("document root is not an object"))?;
    for entry in inclusion.spliced {
        let section = root
            .entry(entry.section.clone())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| malformed(format!("'{}' is not an object", entry.section)))?;
        section.insert(entry.name, entry.value);
    }
    Ok(())
}

struct Spliced {
    section: String,
    name: String,
    value: Value,
}

enum Redirect {
    Pointer(String),
    Inline(Value),
}

struct Inclusion<'a, 'l> {
    base: &'a Url,
    fetcher: &'a mut Fetcher<'l>,
    /// Absolute remote location -> local pointer.
    visited: HashMap<String, String>,
    /// Names taken per section, local and spliced.
    reserved: HashMap<String, HashSet<String>>,
    spliced: Vec<Spliced>,
}

impl<'a, 'l> Inclusion<'a, 'l> {
    fn new(doc: &Value, base: &'a Url, fetcher: &'a mut Fetcher<'l>) -> Self {
        let reserved = doc
            .as_object()
            .map(|root| {
                root.iter()
                    .filter_map(|(section, entries)| {
                        let names = entries.as_object()?.keys().cloned().collect();
                        Some((section.clone(), names))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            base,
            fetcher,
            visited: HashMap::new(),
            reserved,
            spliced: Vec::new(),
        }
    }

    fn rewrite(&mut self, node: &mut Value, depth: usize) -> Result<(), PassError> {
        if depth > MAX_INLINE_DEPTH {
            return Err(malformed("remote references inline each other without end"));
        }
        match node {
            Value::Object(map) => {
                let mut child_depth = depth;
                if let Some(r) = map.get("$ref").and_then(Value::as_str).map(str::to_string) {
                    match self.redirect(&r)? {
                        Some(Redirect::Pointer(local)) => {
                            map.insert("$ref".to_string(), Value::String(local));
                        }
                        Some(Redirect::Inline(value)) => {
                            map.remove("$ref");
                            if let Value::Object(inline) = value {
                                for (key, v) in inline {
                                    map.entry(key).or_insert(v);
                                }
                            }
                            child_depth += 1;
                        }
                        None => {}
                    }
                }
                for (key, child) in map.iter_mut() {
                    if key == EXAMPLES_KEY {
                        continue;
                    }
                    self.rewrite(child, child_depth)?;
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.rewrite(item, depth)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn redirect(&mut self, reference: &str) -> Result<Option<Redirect>, PassError> {
        let parsed = parse_reference(reference);
        if parsed.kind == ReferenceKind::Local {
            return Ok(None);
        }
        let url = resolve_document_url(self.base, parsed.document)?;
        let fragment = parsed.fragment.unwrap_or("");
        if &url == self.base {
            return Ok(Some(Redirect::Pointer(format!("#{}", fragment))));
        }
        self.include(&url, fragment).map(Some)
    }

    fn include(&mut self, url: &Url, fragment: &str) -> Result<Redirect, PassError> {
        let key = format!("{}#{}", url, fragment);
        if let Some(local) = self.visited.get(&key) {
            return Ok(Redirect::Pointer(local.clone()));
        }

        let target_ref = DefRef::from_fragment(fragment);
        let (mut target, siblings) = {
            let remote = self
                .fetcher
                .fetch(url)
                .map_err(|reason| ResolveError::Load {
                    uri: url.to_string(),
                    reason,
                })?;
            let target = target_ref.lookup(remote).cloned().ok_or_else(|| {
                ResolveError::RefNotFound(vec![UnresolvedRef {
                    pointer: key.clone(),
                    used_at: url.to_string(),
                }])
            })?;
            (target, composing_siblings(remote, url, &target_ref))
        };
        absolutize(&mut target, url)?;

        let segments = target_ref.segments();
        let [section, name] = segments.as_slice() else {
            return Ok(Redirect::Inline(target));
        };

        let local_name = self.reserve(section, name);
        let local = DefRef::root().child(section).child(&local_name);
        debug!(remote = %key, local = %local, "splicing remote entry");
        self.visited.insert(key, local.as_str().to_string());
        self.spliced.push(Spliced {
            section: section.clone(),
            name: local_name,
            value: target,
        });

        for sibling in siblings {
            let sibling_ref = DefRef::root().child(section).child(&sibling);
            self.include(url, sibling_ref.pointer())?;
        }

        Ok(Redirect::Pointer(local.as_str().to_string()))
    }

    fn reserve(&mut self, section: &str, name: &str) -> String {
        let taken = self.reserved.entry(section.to_string()).or_default();
        let mut candidate = name.to_string();
        let mut n = 1;
        while taken.contains(&candidate) {
            candidate = format!("{}_{}", name, n);
            n += 1;
        }
        taken.insert(candidate.clone());
        candidate
    }
}

/// Entries of the target's section in `remote` whose `allOf` links to it.
fn composing_siblings(remote: &Value, url: &Url, target: &DefRef) -> Vec<String> {
    let segments = target.segments();
    let [section, name] = segments.as_slice() else {
        return Vec::new();
    };
    let Some(entries) = remote.get(section).and_then(Value::as_object) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|(candidate, _)| *candidate != name)
        .filter(|(_, schema)| {
            schema
                .get("allOf")
                .and_then(Value::as_array)
                .is_some_and(|all_of| {
                    all_of
                        .iter()
                        .filter_map(ref_of)
                        .any(|r| points_into(r, url, target))
                })
        })
        .map(|(candidate, _)| candidate.clone())
        .collect()
}

/// True if `reference`, written inside the document at `url`, targets `target`
/// in that same document.
fn points_into(reference: &str, url: &Url, target: &DefRef) -> bool {
    let parsed = parse_reference(reference);
    let same_document = parsed.kind == ReferenceKind::Local
        || resolve_document_url(url, parsed.document).is_ok_and(|u| &u == url);
    same_document && DefRef::from_fragment(parsed.fragment.unwrap_or("")) == *target
}

/// Rewrites every reference in `value` to an absolute one relative to `url`.
fn absolutize(value: &mut Value, url: &Url) -> Result<(), PassError> {
    match value {
        Value::Object(map) => {
            if let Some(r) = map.get("$ref").and_then(Value::as_str).map(str::to_string) {
                let parsed = parse_reference(&r);
                let document = if parsed.kind == ReferenceKind::Local {
                    url.clone()
                } else {
                    resolve_document_url(url, parsed.document)?
                };
                let absolute = format!("{}#{}", document, parsed.fragment.unwrap_or(""));
                map.insert("$ref".to_string(), Value::String(absolute));
            }
            for (key, child) in map.iter_mut() {
                if key != EXAMPLES_KEY {
                    absolutize(child, url)?;
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                absolutize(item, url)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("file:///specs/svc/main.json").unwrap()
    }

    fn common() -> Value {
        json!({
            "definitions": {
                "Resource": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}, "tags": {"$ref": "#/definitions/Tags"}}
                },
                "Tags": {"type": "object", "additionalProperties": {"type": "string"}},
                "TrackedResource": {
                    "allOf": [{"$ref": "#/definitions/Resource"}],
                    "properties": {"location": {"type": "string"}}
                },
                "Unrelated": {"type": "string"}
            },
            "parameters": {
                "ApiVersion": {"name": "api-version", "in": "query", "type": "string"}
            }
        })
    }

    fn loader() -> MemoryLoader {
        let mut loader = MemoryLoader::new();
        loader
            .register_json("file:///specs/common/types.json", common())
            .unwrap();
        loader
    }

    #[test]
    fn test_splices_targets_once_and_pulls_composing_siblings() {
        let loader = loader();
        let mut fetcher = Fetcher::new(&loader);
        let mut doc = json!({
            "definitions": {
                "Vm": {"allOf": [{"$ref": "../common/types.json#/definitions/Resource"}]},
                "Disk": {"properties": {"owner": {"$ref": "../common/types.json#/definitions/Resource"}}}
            }
        });
        include_remote_references(&mut doc, &base(), &mut fetcher).unwrap();

        let defs = doc["definitions"].as_object().unwrap();
        assert_eq!(defs["Vm"]["allOf"][0]["$ref"], "#/definitions/Resource");
        assert_eq!(defs["Disk"]["properties"]["owner"]["$ref"], "#/definitions/Resource");
        assert!(defs.contains_key("Tags"));
        assert!(defs.contains_key("TrackedResource"));
        assert!(!defs.contains_key("Unrelated"));
        assert_eq!(
            defs["TrackedResource"]["allOf"][0]["$ref"],
            "#/definitions/Resource"
        );
        assert_eq!(
            defs["Resource"]["properties"]["tags"]["$ref"],
            "#/definitions/Tags"
        );
    }

    #[test]
    fn test_name_collisions_get_suffix() {
        let loader = loader();
        let mut fetcher = Fetcher::new(&loader);
        let mut doc = json!({
            "definitions": {
                "Tags": {"type": "array"},
                "Holder": {"properties": {"t": {"$ref": "../common/types.json#/definitions/Tags"}}}
            }
        });
        include_remote_references(&mut doc, &base(), &mut fetcher).unwrap();
        assert_eq!(
            doc["definitions"]["Holder"]["properties"]["t"]["$ref"],
            "#/definitions/Tags_1"
        );
        assert_eq!(doc["definitions"]["Tags"]["type"], "array");
    }

    #[test]
    fn test_shared_parameters_are_spliced_into_parameters() {
        let loader = loader();
        let mut fetcher = Fetcher::new(&loader);
        let mut doc = json!({
            "paths": {"/a": {"get": {"parameters": [
                {"$ref": "../common/types.json#/parameters/ApiVersion"}
            ]}}}
        });
        include_remote_references(&mut doc, &base(), &mut fetcher).unwrap();
        assert_eq!(
            doc["paths"]["/a"]["get"]["parameters"][0]["$ref"],
            "#/parameters/ApiVersion"
        );
        assert_eq!(doc["parameters"]["ApiVersion"]["name"], "api-version");
    }

    #[test]
    fn test_missing_document_is_a_load_error() {
        let loader = MemoryLoader::new();
        let mut fetcher = Fetcher::new(&loader);
        let mut doc = json!({"definitions": {"A": {"$ref": "./nope.json#/definitions/B"}}});
        let err = include_remote_references(&mut doc, &base(), &mut fetcher).unwrap_err();
        assert!(matches!(err, PassError::Resolver(ResolveError::Load { .. })));
    }
}
