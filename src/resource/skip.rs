//! Skip Signal
//!
//! Resource logic returns [`Flow<T>`]. `Err(Halt::Skip(..))` means the
//! resource does not apply to this target (missing file, absent tool) and
//! moves the instance to [`InstanceState::Skipped`]. The other halts are
//! failures and surface to the caller as [`ResourceError`]s.

use super::error::ResourceError;
use crate::context::ContextFetchError;
use crate::filter::FilterError;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Active,
    Skipped,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Why resource logic stopped before producing a value
#[derive(Debug)]
pub enum Halt {
    /// Preconditions unmet; not applicable here
    Skip(String),
    /// Resource logic failed; the framework attaches resource and member names
    Fail(String),
    /// A typed error from the framework or the context
    Error(ResourceError),
}

/// Result type of resource initializers and methods
pub type Flow<T> = Result<T, Halt>;

/// Shorthand for `Halt::Skip`
pub fn skip(reason: impl Into<String>) -> Halt {
    Halt::Skip(reason.into())
}

/// Shorthand for `Halt::Fail`
pub fn fail(message: impl Into<String>) -> Halt {
    Halt::Fail(message.into())
}

impl From<ResourceError> for Halt {
    fn from(err: ResourceError) -> Self {
        Self::Error(err)
    }
}

impl From<ContextFetchError> for Halt {
    fn from(err: ContextFetchError) -> Self {
        Self::Error(ResourceError::Fetch(err))
    }
}

impl From<FilterError> for Halt {
    fn from(err: FilterError) -> Self {
        Self::Error(ResourceError::Filter(err))
    }
}

/// Convert context failures into skips
pub trait OrSkip<T> {
    /// Skip on any fetch error, with `reason` followed by the error
    fn or_skip(self, reason: &str) -> Flow<T>;

    /// Skip when the target is missing or out of the context's reach; other
    /// fetch errors stay errors
    fn or_skip_missing(self, reason: &str) -> Flow<T>;
}

impl<T> OrSkip<T> for Result<T, ContextFetchError> {
    fn or_skip(self, reason: &str) -> Flow<T> {
        self.map_err(|e| Halt::Skip(format!("{}: {}", reason, e)))
    }

    fn or_skip_missing(self, reason: &str) -> Flow<T> {
        self.map_err(|e| {
            if e.is_unavailable() {
                Halt::Skip(format!("{}: {}", reason, e))
            } else {
                Halt::from(e)
            }
        })
    }
}
