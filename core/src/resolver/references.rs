#![deny(missing_docs)]

//! # Reference Verification
//!
//! Walks the whole document and checks that every `$ref` points at an
//! existing location. Remote references are checked by fetching their
//! document. All failures are gathered before reporting.

use super::{Fetcher, EXAMPLES_KEY};
use crate::error::{ResolveError, ResolveResult, UnresolvedRef};
use crate::pointer::{parse_reference, resolve_document_url, DefRef, ReferenceKind};
use serde_json::Value;
use tracing::warn;
use url::Url;

/// Every `(location, $ref)` pair in `value`, in document order.
pub fn collect_refs(value: &Value, at: &DefRef, out: &mut Vec<(DefRef, String)>) {
    match value {
        Value::Object(map) => {
            if let Some(r) = map.get("$ref").and_then(Value::as_str) {
                out.push((at.clone(), r.to_string()));
            }
            for (key, child) in map {
                if key == EXAMPLES_KEY {
                    continue;
                }
                collect_refs(child, &at.child(key), out);
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                collect_refs(item, &at.index(idx), out);
            }
        }
        _ => {}
    }
}

/// Pass 1.
pub(crate) fn verify_references(
    doc: &Value,
    base: &Url,
    fetcher: &mut Fetcher<'_>,
) -> ResolveResult<()> {
    let mut refs = Vec::new();
    collect_refs(doc, &DefRef::root(), &mut refs);

    let missing: Vec<UnresolvedRef> = refs
        .into_iter()
        .filter(|(_, pointer)| !reference_exists(doc, base, fetcher, pointer))
        .map(|(used_at, pointer)| UnresolvedRef {
            pointer,
            used_at: used_at.to_string(),
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ResolveError::RefNotFound(missing))
    }
}

fn reference_exists(doc: &Value, base: &Url, fetcher: &mut Fetcher<'_>, pointer: &str) -> bool {
    let parsed = parse_reference(pointer);
    let target = DefRef::from_fragment(parsed.fragment.unwrap_or(""));

    if parsed.kind == ReferenceKind::Local {
        return target.lookup(doc).is_some();
    }

    let Ok(url) = resolve_document_url(base, parsed.document) else {
        return false;
    };
    if &url == base {
        return target.lookup(doc).is_some();
    }
    match fetcher.fetch(&url) {
        Ok(remote) => target.lookup(remote).is_some(),
        Err(err) => {
            warn!(%url, error = %err, "referenced document could not be loaded");
            false
        }
    }
}
