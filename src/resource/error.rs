//! Resource Errors
//!
//! Authoring mistakes (bad names, unsupported versions) surface at
//! registration time. Target-state problems are expected to become a skip
//! instead, so the variants reachable at query time are kept separate.

use super::definition::ValueKind;
use super::naming::MethodKind;
use crate::context::ContextFetchError;
use crate::filter::FilterError;
use thiserror::Error;

/// Errors raised by the registry and by resource instances
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The requested name was never registered
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// The name exists but every registered version is newer than requested
    #[error("resource '{name}' has no version <= {requested} (registered: {available:?})")]
    NoCompatibleVersion {
        name: String,
        requested: u32,
        available: Vec<u32>,
    },

    /// The definition targets an API generation this runtime cannot honor
    #[error("resource '{name}' declares API version {version}, supported range is 1..={max}")]
    VersionUnsupported { name: String, version: u32, max: u32 },

    /// A declared method name cannot be transformed
    #[error("invalid method name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A predicate declared with a non-boolean value shape
    #[error("method '{name}' is declared {kind:?} but returns {returns:?}")]
    KindMismatch {
        name: String,
        kind: MethodKind,
        returns: ValueKind,
    },

    /// Two declared members map to the same exposed name
    #[error("resource '{resource}': '{first}' and '{second}' are both exposed as '{exposed}'")]
    DuplicateExposedName {
        resource: String,
        first: String,
        second: String,
        exposed: String,
    },

    /// Accessor name not exposed by this resource
    #[error("resource '{resource}' has no member '{member}'")]
    UnknownMember { resource: String, member: String },

    /// A property was used where a matcher is required
    #[error("'{member}' on resource '{resource}' is not a matcher")]
    NotAMatcher { resource: String, member: String },

    /// Filtering requested on a singular resource
    #[error("resource '{0}' is not plural and cannot be filtered")]
    NotPlural(String),

    /// Malformed parameters or unusable target data during construction
    #[error("failed to construct resource '{resource}': {message}")]
    Construction { resource: String, message: String },

    /// Resource logic failed while computing a member
    #[error("failed to evaluate '{member}' on resource '{resource}': {message}")]
    Evaluation {
        resource: String,
        member: String,
        message: String,
    },

    /// The process-wide registry has not been installed
    #[error("resource registry is not initialized")]
    RegistryUninitialized,

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Fetch(#[from] ContextFetchError),
}

impl ResourceError {
    /// Create a construction error for a resource
    pub fn construction(resource: &str, message: impl Into<String>) -> Self {
        Self::Construction {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// True for errors caused by a broken resource definition
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self,
            Self::VersionUnsupported { .. }
                | Self::InvalidName { .. }
                | Self::KindMismatch { .. }
                | Self::DuplicateExposedName { .. }
        )
    }
}
