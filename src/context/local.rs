//! Local Context
//!
//! Answers selectors from the machine inspekt runs on. An optional root
//! prefix lets a mounted image or a test fixture directory stand in for `/`.
//! Commands always run on the host, so a rooted context refuses them unless
//! host commands are enabled explicitly.

use super::{ContextFetchError, ExecutionContext, FetchOutput, TargetSelector};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Execution context backed by the local filesystem and shell
#[derive(Debug, Clone)]
pub struct LocalContext {
    root: Option<PathBuf>,
    shell: String,
    host_commands: bool,
}

impl Default for LocalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalContext {
    pub fn new() -> Self {
        Self {
            root: None,
            shell: "sh".to_string(),
            host_commands: false,
        }
    }

    /// Resolve all file paths below `root`.
    ///
    /// Command selectors are answered with `Unsupported` from then on: a
    /// command would report host state, not the state under `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Run commands on the host even when rooted, with `root` as the
    /// working directory
    pub fn with_host_commands(mut self) -> Self {
        self.host_commands = true;
        self
    }

    /// Use a different shell for commands
    pub fn with_shell(mut self, shell: &str) -> Self {
        self.shell = shell.to_string();
        self
    }

    /// Map a target path onto the local filesystem
    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => {
                let relative = path.strip_prefix("/").unwrap_or(path);
                root.join(relative)
            }
            None => path.to_path_buf(),
        }
    }

    fn read_file(&self, selector: &TargetSelector, path: &Path) -> Result<FetchOutput, ContextFetchError> {
        let local = self.resolve(path);
        tracing::debug!("Reading {}", local.display());

        std::fs::read(&local)
            .map(FetchOutput::Bytes)
            .map_err(|e| ContextFetchError::from_io(selector, e))
    }

    fn stat(&self, selector: &TargetSelector, path: &Path) -> Result<FetchOutput, ContextFetchError> {
        let local = self.resolve(path);
        let meta =
            std::fs::symlink_metadata(&local).map_err(|e| ContextFetchError::from_io(selector, e))?;

        let kind = if meta.file_type().is_symlink() {
            "symlink"
        } else if meta.is_dir() {
            "directory"
        } else if meta.is_file() {
            "file"
        } else {
            "other"
        };

        let modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

        Ok(FetchOutput::Structured(json!({
            "kind": kind,
            "size": meta.len(),
            "mode": file_mode(&meta),
            "modified": modified,
        })))
    }

    fn run(&self, selector: &TargetSelector, command: &str) -> Result<FetchOutput, ContextFetchError> {
        if self.root.is_some() && !self.host_commands {
            tracing::debug!("Refusing host command under a root: {}", command);
            return Err(ContextFetchError::Unsupported {
                selector: selector.to_string(),
            });
        }

        tracing::info!("Executing: {} -c {}", self.shell, command);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(root) = &self.root {
            cmd.current_dir(root);
        }

        let output = cmd
            .output()
            .map_err(|e| ContextFetchError::from_io(selector, e))?;

        Ok(FetchOutput::Structured(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_status": output.status.code().unwrap_or(-1),
        })))
    }
}

impl ExecutionContext for LocalContext {
    fn fetch(&self, selector: &TargetSelector) -> Result<FetchOutput, ContextFetchError> {
        match selector {
            TargetSelector::File(path) => self.read_file(selector, path),
            TargetSelector::Metadata(path) => self.stat(selector, path),
            TargetSelector::Command(command) => self.run(selector, command),
        }
    }

    fn describe(&self) -> String {
        match &self.root {
            Some(root) => format!("local:{}", root.display()),
            None => "local".to_string(),
        }
    }
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> Value {
    use std::os::unix::fs::PermissionsExt;
    Value::String(format!("{:04o}", meta.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> Value {
    Value::Null
}
