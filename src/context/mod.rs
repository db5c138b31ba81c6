//! Execution Context
//!
//! The collaborator resources use to reach the target. A context answers a
//! [`TargetSelector`] with raw bytes or structured data, or with a
//! [`ContextFetchError`] that the resource may turn into a skip.
//!
//! - [`local`] - Reads the local filesystem and runs commands through `sh -c`
//! - [`mock`] - Canned responses for tests

pub mod local;
pub mod mock;

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use local::LocalContext;
pub use mock::MockContext;

/// Shared handle to an execution context; instances borrow it, never own it
pub type SharedContext = Arc<dyn ExecutionContext>;

/// What to fetch from the target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetSelector {
    /// Raw file contents
    File(PathBuf),
    /// File metadata as a JSON object (`kind`, `size`, `mode`, `modified`)
    Metadata(PathBuf),
    /// Shell command; answered with `stdout`, `stderr`, `exit_status`
    Command(String),
}

impl TargetSelector {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn metadata(path: impl Into<PathBuf>) -> Self {
        Self::Metadata(path.into())
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::Command(command.into())
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Metadata(path) => write!(f, "metadata:{}", path.display()),
            Self::Command(cmd) => write!(f, "command:{}", cmd),
        }
    }
}

/// Data returned by a fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutput {
    Bytes(Vec<u8>),
    Structured(Value),
}

impl FetchOutput {
    /// Decode the output as UTF-8 text
    pub fn into_text(self, selector: &TargetSelector) -> Result<String, ContextFetchError> {
        match self {
            Self::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| ContextFetchError::Decode {
                selector: selector.to_string(),
                message: e.to_string(),
            }),
            Self::Structured(Value::String(s)) => Ok(s),
            Self::Structured(other) => Ok(other.to_string()),
        }
    }

    /// Decode the output as JSON (structured output is passed through)
    pub fn into_json(self, selector: &TargetSelector) -> Result<Value, ContextFetchError> {
        match self {
            Self::Bytes(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| ContextFetchError::Decode {
                    selector: selector.to_string(),
                    message: e.to_string(),
                })
            }
            Self::Structured(value) => Ok(value),
        }
    }
}

/// Errors raised when the target cannot provide the requested data
#[derive(Debug, Error)]
pub enum ContextFetchError {
    #[error("{selector} not found")]
    NotFound { selector: String },

    #[error("permission denied reading {selector}")]
    PermissionDenied { selector: String },

    #[error("I/O error on {selector}: {source}")]
    Io {
        selector: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {selector}: {message}")]
    Decode { selector: String, message: String },

    #[error("{selector} is not supported by this context")]
    Unsupported { selector: String },
}

impl ContextFetchError {
    /// Map an I/O error onto the fetch taxonomy
    pub fn from_io(selector: &TargetSelector, source: std::io::Error) -> Self {
        let selector = selector.to_string();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { selector },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { selector },
            _ => Self::Io { selector, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The target is absent or this context cannot reach it
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Unsupported { .. })
    }
}

/// Reaches the target system on behalf of resources
pub trait ExecutionContext {
    /// Fetch raw or structured data for a selector; blocking
    fn fetch(&self, selector: &TargetSelector) -> Result<FetchOutput, ContextFetchError>;

    /// Short label for logs and reports
    fn describe(&self) -> String {
        "target".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selector_display() {
        assert_eq!(TargetSelector::file("/etc/hosts").to_string(), "file:/etc/hosts");
        assert_eq!(TargetSelector::command("ps").to_string(), "command:ps");
    }

    #[test]
    fn test_into_json_parses_bytes() {
        let selector = TargetSelector::file("/tmp/x.json");
        let output = FetchOutput::Bytes(br#"{"a": 1}"#.to_vec());
        assert_eq!(output.into_json(&selector).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_into_json_reports_decode_error() {
        let selector = TargetSelector::file("/tmp/x.json");
        let err = FetchOutput::Bytes(b"not json".to_vec())
            .into_json(&selector)
            .unwrap_err();
        assert!(matches!(err, ContextFetchError::Decode { .. }));
        assert!(err.to_string().contains("/tmp/x.json"));
    }

    #[test]
    fn test_io_error_mapping() {
        let selector = TargetSelector::file("/nope");
        let err = ContextFetchError::from_io(
            &selector,
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
    }
}
