//! `file` - metadata and content of one path on the target

use crate::context::{SharedContext, TargetSelector};
use crate::resource::{
    fail, Flow, MethodDecl, MethodKind, OrSkip, Params, ResourceDefinition, ValueKind,
};
use serde_json::Value;

pub struct FileState {
    path: String,
    meta: Option<Value>,
    context: SharedContext,
}

impl FileState {
    fn inspect(params: &Params, context: &SharedContext) -> Flow<Self> {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return Err(fail("parameter 'path' must be a string"));
        };

        let selector = TargetSelector::metadata(path);
        let meta = match context.fetch(&selector) {
            Ok(output) => Some(output.into_json(&selector)?),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e).or_skip("cannot stat file"),
        };

        Ok(Self {
            path: path.to_string(),
            meta,
            context: context.clone(),
        })
    }

    fn meta_field(&self, field: &str) -> Value {
        self.meta
            .as_ref()
            .and_then(|m| m.get(field))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn is_kind(&self, kind: &str) -> bool {
        self.meta_field("kind").as_str() == Some(kind)
    }

    /// File contents; `None` when the path does not exist
    fn content(&self) -> Flow<Option<String>> {
        if self.meta.is_none() || !self.is_kind("file") {
            return Ok(None);
        }
        let selector = TargetSelector::file(&self.path);
        let output = self.context.fetch(&selector).or_skip("cannot read file")?;
        Ok(Some(output.into_text(&selector)?))
    }
}

pub fn definition() -> ResourceDefinition<FileState> {
    ResourceDefinition::new("file", 1, FileState::inspect)
        .description("Metadata and content of a file on the target")
        .example("file(path: \"/etc/hosts\").be_file")
        .identifier("path")
        .predicate("exist?", |f| Ok(f.meta.is_some()))
        .predicate("file?", |f| Ok(f.is_kind("file")))
        .predicate("directory?", |f| Ok(f.is_kind("directory")))
        .predicate("symlink?", |f| Ok(f.is_kind("symlink")))
        .property("type", |f| Ok(f.meta_field("kind")))
        .property("size", |f| Ok(f.meta_field("size")))
        .property("mode", |f| Ok(f.meta_field("mode")))
        .property("modified", |f| Ok(f.meta_field("modified")))
        .property("content", |f| Ok(f.content()?.map(Value::String).unwrap_or(Value::Null)))
        .collection("lines", |f| {
            Ok(f.content()?
                .map(|c| c.lines().map(|l| Value::String(l.to_string())).collect())
                .unwrap_or_default())
        })
        .method(
            MethodDecl::new("line_count", MethodKind::Property, ValueKind::Count),
            |f| Ok(Value::from(f.content()?.map(|c| c.lines().count()).unwrap_or(0))),
        )
        .predicate("has_content", |f| {
            Ok(f.content()?.is_some_and(|c| !c.trim().is_empty()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MockContext;
    use crate::resource::Registry;
    use serde_json::json;
    use std::sync::Arc;

    fn open(ctx: MockContext, path: &str) -> crate::resource::ResourceInstance {
        let mut registry = Registry::new();
        registry.register(definition()).unwrap();
        registry
            .instantiate(
                "file",
                None,
                json!({"path": path}).as_object().cloned().unwrap(),
                Arc::new(ctx),
            )
            .unwrap()
    }

    #[test]
    fn test_existing_file() {
        let f = open(MockContext::new().with_file("/etc/hosts", "127.0.0.1 localhost\n::1 localhost\n"), "/etc/hosts");
        assert!(f.matcher("be_exist").unwrap());
        assert!(f.matcher("be_file").unwrap());
        assert!(!f.matcher("be_directory").unwrap());
        assert!(f.matcher("have_content").unwrap());
        assert_eq!(f.property("mode").unwrap(), json!("0644"));
        assert_eq!(f.property("line_count").unwrap(), json!(2));
        assert_eq!(f.property("lines").unwrap()[1], json!("::1 localhost"));
    }

    #[test]
    fn test_missing_file_is_not_skipped() {
        let f = open(MockContext::new(), "/etc/absent");
        assert!(!f.is_skipped());
        assert!(!f.matcher("be_exist").unwrap());
        assert_eq!(f.property("content").unwrap(), Value::Null);
        assert_eq!(f.property("lines").unwrap(), json!([]));
        assert_eq!(f.property("path").unwrap(), json!("/etc/absent"));
    }

    #[test]
    fn test_directory() {
        let f = open(MockContext::new().with_directory("/var/log"), "/var/log");
        assert!(f.matcher("be_directory").unwrap());
        assert!(!f.matcher("have_content").unwrap());
    }

    #[test]
    fn test_unreadable_content_skips() {
        let ctx = MockContext::new()
            .with_file("/etc/shadow", "")
            .with_denied(TargetSelector::file("/etc/shadow"));
        let f = open(ctx, "/etc/shadow");
        assert!(f.matcher("be_exist").unwrap());
        assert_eq!(f.property("content").unwrap(), Value::Null);
        assert!(f.is_skipped());
        assert!(f.skip_reason().unwrap().starts_with("cannot read file"));
    }
}
