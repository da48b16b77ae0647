#![deny(missing_docs)]

//! # Pointers and References
//!
//! [`DefRef`] is the identity of every schema location in a document. It is a
//! JSON Pointer with a leading `#`, escaped per RFC 6901.
//!
//! The helpers below split `$ref` strings into their document and fragment
//! parts and resolve relative documents against a base URL. They never fetch
//! anything themselves.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

/// Identity of a definition, parameter or inline schema location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefRef(String);

impl DefRef {
    /// The document root, `#`.
    pub fn root() -> Self {
        DefRef("#".to_string())
    }

    /// Builds a reference from a local `$ref` (`#/definitions/Pet`) or a bare
    /// fragment (`/definitions/Pet`). Percent-encoded segments are decoded so
    /// that two spellings of the same location compare equal.
    pub fn from_fragment(fragment: &str) -> Self {
        let pointer = fragment.trim_start_matches('#');
        let mut out = DefRef::root();
        if pointer.is_empty() {
            return out;
        }
        for segment in pointer.trim_start_matches('/').split('/') {
            out = out.child(&decode_pointer_segment(segment));
        }
        out
    }

    /// `#/definitions/{name}`.
    pub fn definition(name: &str) -> Self {
        DefRef::root().child("definitions").child(name)
    }

    /// Appends one unescaped segment.
    pub fn child(&self, segment: &str) -> Self {
        DefRef(format!("{}/{}", self.0, escape_pointer_segment(segment)))
    }

    /// Appends an array index.
    pub fn index(&self, idx: usize) -> Self {
        DefRef(format!("{}/{}", self.0, idx))
    }

    /// The reference as written in a `$ref`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The RFC 6901 pointer without `#`, as accepted by [`Value::pointer`].
    pub fn pointer(&self) -> &str {
        &self.0[1..]
    }

    /// Decoded path segments.
    pub fn segments(&self) -> Vec<String> {
        let pointer = self.pointer();
        if pointer.is_empty() {
            return Vec::new();
        }
        pointer[1..]
            .split('/')
            .map(|s| s.replace("~1", "/").replace("~0", "~"))
            .collect()
    }

    /// Name of the definition if this points at `#/definitions/{name}`.
    pub fn definition_name(&self) -> Option<String> {
        match self.segments().as_slice() {
            [section, name] if section == "definitions" => Some(name.clone()),
            _ => None,
        }
    }

    /// Last decoded segment.
    pub fn last_segment(&self) -> Option<String> {
        self.segments().pop()
    }

    /// Looks the location up in `doc`.
    pub fn lookup<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        doc.pointer(self.pointer())
    }

    /// Mutable lookup in `doc`.
    pub fn lookup_mut<'a>(&self, doc: &'a mut Value) -> Option<&'a mut Value> {
        doc.pointer_mut(self.pointer())
    }
}

impl fmt::Display for DefRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a `$ref` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `#/...` inside the current document.
    Local,
    /// A relative document path, e.g. `./common.json#/definitions/Error`.
    Relative,
    /// An absolute URL.
    Remote,
}

/// A `$ref` split into document and fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Classification of the document part.
    pub kind: ReferenceKind,
    /// Document part (empty for local references).
    pub document: &'a str,
    /// Fragment after `#`, if any.
    pub fragment: Option<&'a str>,
}

/// Splits a `$ref` string.
pub fn parse_reference(ref_str: &str) -> Reference<'_> {
    let (document, fragment) = match ref_str.split_once('#') {
        Some((doc, frag)) => (doc, Some(frag)),
        None => (ref_str, None),
    };

    let kind = if document.is_empty() {
        ReferenceKind::Local
    } else if Url::parse(document).is_ok() {
        ReferenceKind::Remote
    } else {
        ReferenceKind::Relative
    };

    Reference {
        kind,
        document,
        fragment,
    }
}

/// Resolves the document part of a reference against `base`.
pub fn resolve_document_url(base: &Url, document: &str) -> Result<Url, url::ParseError> {
    let mut url = base.join(document)?;
    url.set_fragment(None);
    Ok(url)
}

/// Decodes a JSON Pointer segment (handles `~1`, `~0` and percent encoding).
pub fn decode_pointer_segment(segment: &str) -> String {
    let decoded = segment.replace("~1", "/").replace("~0", "~");
    percent_decode_str(&decoded).decode_utf8_lossy().into_owned()
}

/// Escapes a segment for use inside a JSON Pointer.
pub fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Returns the `$ref` string of a reference node.
pub fn ref_of(node: &Value) -> Option<&str> {
    node.get("$ref").and_then(Value::as_str)
}
