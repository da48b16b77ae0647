//! # Error Handling
//!
//! Error enums for the two phases of the engine.
//!
//! - [`ResolveError`] aborts a whole document resolution.
//! - [`GenerateError`] describes a problem with one subtree during example
//!   generation. The generator logs these and carries on.
//! - [`LoadError`] is produced by document loaders.

use crate::pointer::DefRef;
use derive_more::{Display, From};
use std::error::Error;

/// A pointer that did not resolve, together with the place that used it.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("'{pointer}' (used at {used_at})")]
pub struct UnresolvedRef {
    /// The `$ref` value as written in the document.
    pub pointer: String,
    /// Pointer to the node holding the `$ref`.
    pub used_at: String,
}

/// Resolver pass identifiers, used to label internal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Pass {
    /// Pass 1.
    #[display("reference verification")]
    ReferenceVerification,
    /// Pass 2.
    #[display("path unification")]
    PathUnification,
    /// Pass 3.
    #[display("cross-file inclusion")]
    CrossFileInclusion,
    /// Pass 4.
    #[display("inline-definition hoisting")]
    Hoisting,
    /// Pass 5.
    #[display("composition flattening")]
    CompositionFlattening,
    /// Pass 6.
    #[display("polymorphism expansion")]
    PolymorphismExpansion,
    /// Pass 7.
    #[display("composition cleanup")]
    CompositionCleanup,
    /// Pass 8.
    #[display("permissiveness default")]
    PermissivenessDefault,
    /// Pass 9.
    #[display("host-parameter merge")]
    HostParameterMerge,
    /// Pass 10.
    #[display("nullability widening")]
    NullabilityWidening,
}

/// Fatal errors of the resolution phase.
#[derive(Debug, Display)]
pub enum ResolveError {
    /// Every pointer that failed verification, reported together.
    #[display("Unresolved references: {}", join_unresolved(_0))]
    RefNotFound(Vec<UnresolvedRef>),

    /// A referenced document could not be fetched during inclusion.
    #[display("Failed to load '{uri}': {reason}")]
    Load {
        /// Absolute location of the document.
        uri: String,
        /// Loader failure.
        reason: LoadError,
    },

    /// Any other failure raised inside a pass, with its original cause.
    #[display("Internal error during {pass}: {cause}")]
    Internal {
        /// The pass that failed.
        pass: Pass,
        /// The original failure.
        cause: Box<dyn Error + Send + Sync>,
    },
}

fn join_unresolved(refs: &[UnresolvedRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Manual implementation so `Internal` exposes its cause.
impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResolveError::RefNotFound(_) => None,
            ResolveError::Load { reason, .. } => Some(reason as &(dyn Error + 'static)),
            ResolveError::Internal { cause, .. } => Some(cause.as_ref() as &(dyn Error + 'static)),
        }
    }
}

/// Non-fatal problems found while generating examples.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum GenerateError {
    /// The schema cannot produce a value.
    #[display("Invalid schema at {def_ref}: {reason}")]
    InvalidSchema {
        /// Offending location.
        def_ref: DefRef,
        /// What is wrong with it.
        reason: String,
    },

    /// The synthetic additional-property key is already a declared property.
    #[display("Additional property key '{key}' collides with a declared property of {def_ref}")]
    AdditionalPropertiesCollision {
        /// Object definition.
        def_ref: DefRef,
        /// Generated key.
        key: String,
    },

    /// The chosen discriminator value is missing from the discriminator map.
    #[display("Discriminator value '{value}' of {def_ref} maps to no subtype")]
    DiscriminatorSubtypeMissing {
        /// Polymorphic base definition.
        def_ref: DefRef,
        /// Selected discriminator value.
        value: String,
    },
}

impl Error for GenerateError {}

/// Failures of a [`crate::loader::DocumentLoader`].
#[derive(Debug, Display, From)]
pub enum LoadError {
    /// Wrapper for standard IO errors.
    #[display("IO Error: {_0}")]
    Io(std::io::Error),

    /// The document is not valid JSON/YAML.
    #[from(ignore)]
    #[display("Parse Error: {_0}")]
    Parse(String),

    /// The location cannot be served by this loader (e.g. a network URL).
    #[from(ignore)]
    #[display("Unsupported location: {_0}")]
    Unsupported(String),
}

impl Error for LoadError {}

/// Helper type alias for resolution results.
pub type ResolveResult<T> = Result<T, ResolveError>;
