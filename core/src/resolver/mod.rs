#![deny(missing_docs)]

//! # Schema Resolver
//!
//! Normalizes a raw document in a fixed sequence of passes, then compiles the
//! result into a [`ResolvedDocument`].
//!
//! 1. **references**: every `$ref` must resolve (failures batched).
//! 2. **normalization**: `x-ms-paths` is unioned into `paths`.
//! 3. **inclusion**: remote references are spliced into the local document.
//! 4. **hoisting**: inline object schemas become named definitions.
//! 5. **composition**: `allOf` parents are merged into their children.
//! 6. **polymorphism**: discriminator hierarchies become `oneOf` sets.
//! 7. **composition**: `allOf` lists are removed.
//! 8. **normalization**: objects default to `additionalProperties: false`.
//! 9. **normalization**: host-template parameters join every operation.
//! 10. **normalization**: optional or `x-nullable` schemas accept `null`.
//!
//! Failures raised inside passes 2-10 are wrapped once, here, into
//! [`ResolveError::Internal`], unless they already are resolver errors.

pub mod composition;
pub mod hoisting;
pub mod inclusion;
pub mod normalization;
pub mod polymorphism;
pub mod references;

use crate::document::ResolvedDocument;
use crate::error::{LoadError, Pass, ResolveError, ResolveResult};
use crate::loader::{DocumentLoader, MemoryLoader};
use derive_more::Display;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use tracing::debug;
use url::Url;

/// Key under which real examples are attached to operations. Never schema.
pub(crate) const EXAMPLES_KEY: &str = "x-ms-examples";

/// Base URL used when a document is resolved without a location.
pub const IN_MEMORY_BASE: &str = "file:///document.json";

/// Resolves documents fetched relative to `base` through `loader`.
pub struct Resolver<'l> {
    loader: &'l dyn DocumentLoader,
    base: Url,
}

impl<'l> Resolver<'l> {
    /// Creates a resolver for the document located at `base`.
    pub fn new(loader: &'l dyn DocumentLoader, base: Url) -> Self {
        Self { loader, base }
    }

    /// Runs every pass over `document`.
    pub fn resolve(&self, document: Value) -> ResolveResult<ResolvedDocument> {
        let mut doc = document;
        let mut fetcher = Fetcher::new(self.loader);
        debug!(base = %self.base, "resolving document");

        references::verify_references(&doc, &self.base, &mut fetcher)?;

        run_pass(
            Pass::PathUnification,
            normalization::unify_paths(&mut doc),
        )?;
        run_pass(
            Pass::CrossFileInclusion,
            inclusion::include_remote_references(&mut doc, &self.base, &mut fetcher),
        )?;
        run_pass(
            Pass::Hoisting,
            hoisting::hoist_inline_definitions(&mut doc),
        )?;
        let parents = run_pass(
            Pass::CompositionFlattening,
            composition::flatten_compositions(&mut doc),
        )?;
        run_pass(
            Pass::PolymorphismExpansion,
            polymorphism::expand_polymorphism(&mut doc),
        )?;
        run_pass(
            Pass::CompositionCleanup,
            composition::remove_compositions(&mut doc),
        )?;
        run_pass(
            Pass::PermissivenessDefault,
            normalization::default_additional_properties(&mut doc),
        )?;
        run_pass(
            Pass::HostParameterMerge,
            normalization::merge_host_parameters(&mut doc),
        )?;
        run_pass(
            Pass::NullabilityWidening,
            normalization::widen_nullable(&mut doc),
        )?;

        Ok(ResolvedDocument::compile(doc, parents))
    }
}

/// Resolves a self-contained document (no remote references).
pub fn resolve_in_memory(document: Value) -> ResolveResult<ResolvedDocument> {
    let loader = MemoryLoader::new();
    let base = Url::parse(IN_MEMORY_BASE).map_err(|e| ResolveError::Internal {
        pass: Pass::ReferenceVerification,
        cause: Box::new(e),
    })?;
    Resolver::new(&loader, base).resolve(document)
}

/// Failure inside a single pass, before it is labelled with the pass.
#[derive(Debug)]
pub(crate) enum PassError {
    /// Already a resolver error; propagated untouched.
    Resolver(ResolveError),
    /// Anything else; wrapped into [`ResolveError::Internal`].
    Fault(Box<dyn Error + Send + Sync>),
}

impl From<ResolveError> for PassError {
    fn from(err: ResolveError) -> Self {
        PassError::Resolver(err)
    }
}

impl From<url::ParseError> for PassError {
    fn from(err: url::ParseError) -> Self {
        PassError::Fault(Box::new(err))
    }
}

/// A structural problem in the document that a pass cannot work around.
#[derive(Debug, Display)]
#[display("{_0}")]
pub(crate) struct MalformedDocument(pub String);

impl Error for MalformedDocument {}

/// Shorthand for a [`MalformedDocument`] fault.
pub(crate) fn malformed(message: impl Into<String>) -> PassError {
    PassError::Fault(Box::new(MalformedDocument(message.into())))
}

fn run_pass<T>(pass: Pass, outcome: Result<T, PassError>) -> ResolveResult<T> {
    match outcome {
        Ok(value) => {
            debug!(%pass, "pass complete");
            Ok(value)
        }
        Err(PassError::Resolver(err)) => Err(err),
        Err(PassError::Fault(cause)) => Err(ResolveError::Internal { pass, cause }),
    }
}

/// Fetches remote documents once per absolute location.
pub(crate) struct Fetcher<'l> {
    loader: &'l dyn DocumentLoader,
    cache: HashMap<String, Value>,
}

impl<'l> Fetcher<'l> {
    pub(crate) fn new(loader: &'l dyn DocumentLoader) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
        }
    }

    pub(crate) fn fetch(&mut self, location: &Url) -> Result<&Value, LoadError> {
        let key = location.to_string();
        if !self.cache.contains_key(&key) {
            debug!(%location, "fetching referenced document");
            let doc = self.loader.fetch(location)?;
            self.cache.insert(key.clone(), doc);
        }
        Ok(&self.cache[&key])
    }
}

/// HTTP methods that may appear as operations in a path item.
pub(crate) const HTTP_METHODS: [&str; 7] =
    ["get", "put", "post", "delete", "options", "head", "patch"];

/// Visits every operation object under `paths`.
pub(crate) fn for_each_operation(
    doc: &mut Value,
    mut f: impl FnMut(&str, &str, &mut Value) -> Result<(), PassError>,
) -> Result<(), PassError> {
    let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) else {
        return Ok(());
    };
    for (path, item) in paths.iter_mut() {
        let Some(item) = item.as_object_mut() else {
            continue;
        };
        for (method, operation) in item.iter_mut() {
            if HTTP_METHODS.contains(&method.as_str()) && operation.is_object() {
                f(path, method, operation)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_pass_wraps_faults_once() {
        let err = run_pass::<()>(Pass::Hoisting, Err(malformed("bad node"))).unwrap_err();
        match err {
            ResolveError::Internal { pass, cause } => {
                assert_eq!(pass, Pass::Hoisting);
                assert_eq!(cause.to_string(), "bad node");
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }

    #[test]
    fn test_run_pass_keeps_resolver_errors() {
        let err = run_pass::<()>(
            Pass::CrossFileInclusion,
            Err(PassError::Resolver(ResolveError::RefNotFound(vec![]))),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::RefNotFound(_)));
    }

    #[test]
    fn test_for_each_operation_skips_non_methods() {
        let mut doc = json!({
            "paths": {
                "/pets": {
                    "parameters": [],
                    "get": {"operationId": "Pets_List"},
                    "x-ms-extra": {}
                }
            }
        });
        let mut seen = Vec::new();
        for_each_operation(&mut doc, |path, method, _| {
            seen.push(format!("{method} {path}"));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["get /pets"]);
    }
}
