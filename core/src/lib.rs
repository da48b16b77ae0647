#![deny(missing_docs)]

//! # Specmock Core
//!
//! Schema resolution and example generation for Swagger 2.0 documents.
//!
//! A raw document is resolved once into a [`ResolvedDocument`]; examples are
//! then generated from it with a [`CachePair`] owned by the caller.

/// Shared error types.
pub mod error;

/// JSON pointers and `$ref` parsing.
pub mod pointer;

/// Document loaders.
pub mod loader;

/// Discriminator hierarchies.
pub mod polymorphic;

/// The multi-pass schema resolver.
pub mod resolver;

/// Compiled definition types.
pub mod model;

/// The resolved document and its definition arena.
pub mod document;

/// Payload and mock caches.
pub mod cache;

/// Leaf value synthesis.
pub mod synthesizer;

/// Cache-aware example generation.
pub mod generator;

/// Cached fragment to JSON conversion.
pub mod materializer;

/// Per-operation example documents.
pub mod example;

pub use cache::{CacheItem, CachePair, MockCache, PayloadCache};
pub use document::ResolvedDocument;
pub use error::{GenerateError, LoadError, ResolveError, ResolveResult};
pub use example::{ExampleDocument, GeneratorOptions, OperationExampleBuilder, ResponseExample};
pub use generator::{DiscriminatorPin, ExampleGenerator};
pub use loader::{DocumentLoader, FileLoader, MemoryLoader};
pub use materializer::{AllowAll, Materializer, RuleValidator};
pub use model::{DefinitionTag, OperationRef, ResolvedDefinition};
pub use pointer::DefRef;
pub use resolver::{resolve_in_memory, Resolver};
pub use synthesizer::{DefaultSynthesizer, ValueSynthesizer};
