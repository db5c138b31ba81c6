//! Mock Context
//!
//! A context with canned answers, for exercising resources without a target.
//! Unconfigured selectors answer `NotFound`. Every fetch is recorded so tests
//! can assert what a resource touched, and when.
//!
//! ```ignore
//! let ctx = MockContext::new()
//!     .with_file("/etc/hosts", "127.0.0.1 localhost\n")
//!     .with_command("ps -e", "1 init\n", 0);
//! ```

use super::{ContextFetchError, ExecutionContext, FetchOutput, TargetSelector};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

/// Canned reply for a selector
#[derive(Debug, Clone)]
enum Reply {
    Output(FetchOutput),
    Denied,
    Broken(String),
}

/// Execution context answering from an in-memory table
#[derive(Debug, Default)]
pub struct MockContext {
    replies: HashMap<TargetSelector, Reply>,
    calls: RefCell<Vec<TargetSelector>>,
}

impl MockContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `contents` for the file and a matching metadata record
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        let contents = contents.into();
        let meta = json!({
            "kind": "file",
            "size": contents.len(),
            "mode": "0644",
            "modified": "2024-01-01T00:00:00+00:00",
        });
        self.replies.insert(
            TargetSelector::Metadata(path.clone()),
            Reply::Output(FetchOutput::Structured(meta)),
        );
        self.replies.insert(
            TargetSelector::File(path),
            Reply::Output(FetchOutput::Bytes(contents)),
        );
        self
    }

    /// Serve a JSON document as a file
    pub fn with_json(self, path: impl Into<PathBuf>, value: &Value) -> Self {
        self.with_file(path, value.to_string())
    }

    /// Serve a directory's metadata
    pub fn with_directory(mut self, path: impl Into<PathBuf>) -> Self {
        let meta = json!({
            "kind": "directory",
            "size": 4096,
            "mode": "0755",
            "modified": "2024-01-01T00:00:00+00:00",
        });
        self.replies.insert(
            TargetSelector::Metadata(path.into()),
            Reply::Output(FetchOutput::Structured(meta)),
        );
        self
    }

    /// Serve command output
    pub fn with_command(mut self, command: &str, stdout: &str, exit_status: i32) -> Self {
        let out = json!({
            "stdout": stdout,
            "stderr": "",
            "exit_status": exit_status,
        });
        self.replies.insert(
            TargetSelector::command(command),
            Reply::Output(FetchOutput::Structured(out)),
        );
        self
    }

    /// Answer a selector with `PermissionDenied`
    pub fn with_denied(mut self, selector: TargetSelector) -> Self {
        self.replies.insert(selector, Reply::Denied);
        self
    }

    /// Answer a selector with an I/O failure
    pub fn with_failure(mut self, selector: TargetSelector, message: &str) -> Self {
        self.replies.insert(selector, Reply::Broken(message.to_string()));
        self
    }

    /// Selectors fetched so far, in order
    pub fn calls(&self) -> Vec<TargetSelector> {
        self.calls.borrow().clone()
    }

    /// Number of fetches so far
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ExecutionContext for MockContext {
    fn fetch(&self, selector: &TargetSelector) -> Result<FetchOutput, ContextFetchError> {
        self.calls.borrow_mut().push(selector.clone());

        match self.replies.get(selector) {
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Denied) => Err(ContextFetchError::PermissionDenied {
                selector: selector.to_string(),
            }),
            Some(Reply::Broken(message)) => Err(ContextFetchError::Io {
                selector: selector.to_string(),
                source: std::io::Error::other(message.clone()),
            }),
            None => Err(ContextFetchError::NotFound {
                selector: selector.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_selector_is_not_found() {
        let ctx = MockContext::new();
        let err = ctx.fetch(&TargetSelector::file("/x")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(ctx.call_count(), 1);
    }

    #[test]
    fn test_with_file_serves_contents_and_metadata() {
        let ctx = MockContext::new().with_file("/etc/motd", "hi");
        assert_eq!(
            ctx.fetch(&TargetSelector::file("/etc/motd")).unwrap(),
            FetchOutput::Bytes(b"hi".to_vec())
        );
        let FetchOutput::Structured(meta) =
            ctx.fetch(&TargetSelector::metadata("/etc/motd")).unwrap()
        else {
            panic!("metadata should be structured");
        };
        assert_eq!(meta["size"], 2);
        assert_eq!(
            ctx.calls(),
            vec![
                TargetSelector::file("/etc/motd"),
                TargetSelector::metadata("/etc/motd")
            ]
        );
    }

    #[test]
    fn test_denied_and_broken_replies() {
        let ctx = MockContext::new()
            .with_denied(TargetSelector::file("/root/secret"))
            .with_failure(TargetSelector::command("ps"), "fork failed");
        assert!(matches!(
            ctx.fetch(&TargetSelector::file("/root/secret")),
            Err(ContextFetchError::PermissionDenied { .. })
        ));
        assert!(matches!(
            ctx.fetch(&TargetSelector::command("ps")),
            Err(ContextFetchError::Io { .. })
        ));
    }
}
