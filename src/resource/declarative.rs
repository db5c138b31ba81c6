//! Declarative Resources - Resource definitions loaded from YAML or JSON
//!
//! A resource file names one target (a file path or a command template),
//! how to parse what comes back, and which values to expose. Placeholders
//! of the form `{param}` are filled from the construction parameters.
//!
//! ```yaml
//! name: os_release
//! version: 1
//! fetch:
//!   file: /etc/os-release
//! format:
//!   type: key_value
//! properties:
//!   id: { path: ID }
//! predicates:
//!   debian_like?: { path: ID_LIKE, matches: "\\bdebian\\b" }
//! ```

use super::definition::{MethodDecl, Params, ResourceDefinition, ValueKind};
use super::error::ResourceError;
use super::naming::MethodKind;
use super::registry::Registry;
use super::skip::{fail, skip, Flow, OrSkip};
use crate::context::{SharedContext, TargetSelector};
use crate::filter::criteria::text;
use crate::filter::{extract_path, rows_from_value, Column, ColumnSet, ColumnType, FilterError, Row};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// Resource files compiled into the binary
const EMBEDDED_RESOURCES: &[&str] = &[
    include_str!("../resources/os_release.yaml"),
    include_str!("../resources/passwd.yaml"),
];

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// A resource definition as written in a resource file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    /// Required parameter identifying the target
    #[serde(default)]
    pub identifier: Option<String>,
    /// Written as `fetch: { file: ... }` or `fetch: { command: ... }`
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub fetch: FetchSpec,
    #[serde(default)]
    pub format: Format,
    /// Skip instead of failing when the target is absent
    #[serde(default = "default_true")]
    pub skip_if_missing: bool,
    #[serde(default)]
    pub properties: IndexMap<String, PropertySpec>,
    #[serde(default)]
    pub predicates: IndexMap<String, PredicateSpec>,
    #[serde(default)]
    pub plural: Option<PluralSpec>,
}

/// Where the raw data comes from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSpec {
    File(String),
    Command(String),
}

/// How raw text becomes a JSON document
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Format {
    #[default]
    Json,
    Yaml,
    /// One string per non-blank line
    Lines,
    /// `key=value` lines into one object
    KeyValue {
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Delimited records into an array of objects
    Delimited {
        /// Field separator; whitespace runs when absent
        #[serde(default)]
        delimiter: Option<String>,
        fields: Vec<String>,
        /// Skip the first record
        #[serde(default)]
        header: bool,
    },
}

fn default_separator() -> String {
    "=".to_string()
}

/// A property: a path into the document and the shape of its value
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySpec {
    pub path: String,
    #[serde(default)]
    pub kind: ValueKind,
}

/// A predicate over the value at `path`.
///
/// With `equals` the value is compared loosely, with `matches` its text is
/// matched against a regex, otherwise the value must be present and
/// non-empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredicateSpec {
    pub path: String,
    #[serde(default)]
    pub equals: Option<Value>,
    #[serde(default)]
    pub matches: Option<String>,
}

/// Makes the resource plural
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluralSpec {
    /// Path to the row array; the whole document when absent
    #[serde(default)]
    pub rows: Option<String>,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub kind: ColumnType,
    #[serde(default)]
    pub flatten: bool,
}

/// Parsed target data held by a declarative instance
#[derive(Debug, Clone)]
pub struct Document(pub Value);

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Lines => "lines",
            Self::KeyValue { .. } => "key_value",
            Self::Delimited { .. } => "delimited",
        };
        f.write_str(name)
    }
}

impl Format {
    /// Parse raw text into a document
    pub fn parse(&self, raw: &str) -> Result<Value, String> {
        match self {
            Self::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
            Self::Lines => Ok(Value::Array(
                raw.lines()
                    .map(str::trim_end)
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| Value::String(l.to_string()))
                    .collect(),
            )),
            Self::KeyValue { separator } => Ok(Value::Object(parse_key_value(raw, separator))),
            Self::Delimited {
                delimiter,
                fields,
                header,
            } => Ok(parse_delimited(raw, delimiter.as_deref(), fields, *header)),
        }
    }
}

fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#') || line.starts_with(';')
}

fn parse_key_value(raw: &str, separator: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for line in raw.lines() {
        let line = line.trim();
        if is_comment(line) {
            continue;
        }
        let Some((key, value)) = line.split_once(separator) else {
            continue;
        };
        map.insert(key.trim().to_string(), Value::String(unquote(value.trim()).to_string()));
    }
    map
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_delimited(raw: &str, delimiter: Option<&str>, fields: &[String], header: bool) -> Value {
    let records = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .skip(usize::from(header));

    let rows = records
        .map(|line| {
            let mut parts: Vec<&str> = match delimiter {
                Some(d) => line.split(d).collect(),
                None => line.split_whitespace().collect(),
            };
            // extra parts belong to the last field
            if !fields.is_empty() && parts.len() > fields.len() {
                let rest = parts.split_off(fields.len() - 1);
                let joined = rest.join(delimiter.unwrap_or(" "));
                let mut row = to_row(fields, &parts);
                if let Some(last) = fields.last() {
                    row.insert(last.clone(), Value::String(joined));
                }
                return Value::Object(row);
            }
            Value::Object(to_row(fields, &parts))
        })
        .collect();

    Value::Array(rows)
}

fn to_row(fields: &[String], parts: &[&str]) -> Row {
    fields
        .iter()
        .zip(parts)
        .map(|(field, part)| (field.clone(), Value::String(part.to_string())))
        .collect()
}

/// Fill `{param}` placeholders from `params`; `quote` shell-quotes each value
pub fn render_template(template: &str, params: &Params, quote: bool) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(format!("unclosed placeholder in '{}'", template));
        };
        let name = &after[..end];
        let Some(value) = params.get(name) else {
            return Err(format!("missing parameter '{}' for '{}'", name, template));
        };
        let value = text(value);
        if quote {
            out.push('\'');
            out.push_str(&value.replace('\'', r"'\''"));
            out.push('\'');
        } else {
            out.push_str(&value);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

impl FetchSpec {
    fn selector(&self, params: &Params) -> Result<TargetSelector, String> {
        match self {
            Self::File(path) => Ok(TargetSelector::file(render_template(path, params, false)?)),
            Self::Command(cmd) => Ok(TargetSelector::command(render_template(cmd, params, true)?)),
        }
    }
}

/// Fetch and parse the document a declarative resource inspects
fn load_document(
    fetch: &FetchSpec,
    format: &Format,
    skip_if_missing: bool,
    params: &Params,
    context: &SharedContext,
) -> Flow<Document> {
    let selector = fetch.selector(params).map_err(fail)?;
    let fetched = context.fetch(&selector);
    let output = if skip_if_missing {
        fetched.or_skip_missing("target unavailable")?
    } else {
        fetched?
    };

    let raw = match fetch {
        FetchSpec::File(_) => output.into_text(&selector)?,
        FetchSpec::Command(_) => {
            let result = output.into_json(&selector)?;
            let status = result["exit_status"].as_i64().unwrap_or(-1);
            if status != 0 {
                let message = format!("{} exited with status {}", selector, status);
                return Err(if skip_if_missing { skip(message) } else { fail(message) });
            }
            text(&result["stdout"])
        }
    };

    format
        .parse(&raw)
        .map(Document)
        .map_err(|e| fail(format!("cannot parse {} as {}: {}", selector, format, e)))
}

fn shape(value: Value, kind: ValueKind) -> Value {
    match (kind, value) {
        (ValueKind::Collection, Value::Null) => Value::Array(Vec::new()),
        (ValueKind::Collection, Value::Array(items)) => Value::Array(items),
        (ValueKind::Collection, other) => Value::Array(vec![other]),
        (ValueKind::Count, Value::Array(items)) => Value::from(items.len()),
        (ValueKind::Count, Value::Object(map)) => Value::from(map.len()),
        (ValueKind::Count, Value::Null) => Value::from(0),
        (ValueKind::Count, _) => Value::from(1),
        (ValueKind::Boolean, Value::Null) => Value::Bool(false),
        (_, other) => other,
    }
}

fn present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

enum Test {
    Equals(Value),
    Matches(Regex),
    Present,
}

impl Test {
    fn compile(spec: &PredicateSpec) -> Result<Self, ResourceError> {
        if let Some(pattern) = &spec.matches {
            let re = Regex::new(pattern).map_err(|e| FilterError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            return Ok(Self::Matches(re));
        }
        match &spec.equals {
            Some(expected) => Ok(Self::Equals(expected.clone())),
            None => Ok(Self::Present),
        }
    }

    fn apply(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => {
                value == expected || (!value.is_null() && text(value) == text(expected))
            }
            Self::Matches(re) => !value.is_null() && re.is_match(&text(value)),
            Self::Present => present(value),
        }
    }
}

impl ResourceSpec {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse resource YAML")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse resource JSON")
    }

    /// Load a `.yaml`, `.yml` or `.json` resource file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let spec = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw),
            _ => Self::from_yaml(&raw),
        };
        spec.with_context(|| format!("Invalid resource file {}", path.display()))
    }

    /// Build a registrable definition
    pub fn into_definition(self) -> Result<ResourceDefinition<Document>, ResourceError> {
        let ResourceSpec {
            name,
            version,
            description,
            example,
            identifier,
            fetch,
            format,
            skip_if_missing,
            properties,
            predicates,
            plural,
        } = self;

        let mut def = ResourceDefinition::new(&name, version, move |params, ctx| {
            load_document(&fetch, &format, skip_if_missing, params, ctx)
        });

        if let Some(description) = &description {
            def = def.description(description);
        }
        if let Some(example) = &example {
            def = def.example(example);
        }
        if let Some(param) = &identifier {
            def = def.identifier(param);
        }

        for (prop_name, prop) in properties {
            let PropertySpec { path, kind } = prop;
            def = def.method(
                MethodDecl::new(&prop_name, MethodKind::Property, kind),
                move |doc: &Document| Ok(shape(extract_path(&doc.0, &path), kind)),
            );
        }

        for (pred_name, pred) in predicates {
            let test = Test::compile(&pred)?;
            let path = pred.path;
            def = def.predicate(&pred_name, move |doc: &Document| {
                Ok(test.apply(&extract_path(&doc.0, &path)))
            });
        }

        if let Some(PluralSpec { rows, columns }) = plural {
            let columns = ColumnSet::new(columns.into_iter().map(ColumnSpec::into_column).collect())?;
            def = def.plural(columns, move |doc: &Document| match &rows {
                Some(path) => rows_from_value(&extract_path(&doc.0, path)),
                None => rows_from_value(&doc.0),
            });
        }

        Ok(def)
    }
}

impl ColumnSpec {
    fn into_column(self) -> Column {
        let mut column = Column::new(&self.name).kind(self.kind);
        if let Some(path) = &self.path {
            column = column.path(path);
        }
        if let Some(plural) = &self.plural {
            column = column.plural(plural);
        }
        if self.flatten {
            column = column.flatten();
        }
        column
    }
}

/// Register the resources compiled into the binary
pub fn register_embedded(registry: &mut Registry) -> Result<()> {
    for raw in EMBEDDED_RESOURCES {
        let spec = ResourceSpec::from_yaml(raw)?;
        let name = spec.name.clone();
        registry
            .register(spec.into_definition()?)
            .with_context(|| format!("Failed to register embedded resource {}", name))?;
    }
    Ok(())
}

/// Register every resource file in `dir`; returns how many were loaded.
///
/// Files that fail to parse or validate are logged and skipped.
pub fn register_dir(registry: &mut Registry, dir: &Path) -> Result<usize> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read resource directory {}", dir.display()))?;

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "json")
            )
        })
        .collect();
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        let result = ResourceSpec::from_file(&path).and_then(|spec| {
            registry.register(spec.into_definition()?)?;
            Ok(())
        });
        match result {
            Ok(()) => loaded += 1,
            Err(e) => tracing::warn!("Skipping resource file {}: {:#}", path.display(), e),
        }
    }

    tracing::debug!("Loaded {} resource files from {}", loaded, dir.display());
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MockContext;
    use serde_json::json;
    use std::sync::Arc;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_embedded_resources_register() {
        let mut registry = Registry::new();
        register_embedded(&mut registry).unwrap();
        assert!(registry.contains("os_release"));
        assert!(registry.contains("passwd"));
    }

    #[test]
    fn test_os_release_properties() {
        let mut registry = Registry::new();
        register_embedded(&mut registry).unwrap();

        let ctx: SharedContext = Arc::new(MockContext::new().with_file(
            "/etc/os-release",
            "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n# comment\n",
        ));
        let os = registry
            .instantiate("os_release", None, Params::new(), ctx)
            .unwrap();

        assert_eq!(os.property("name").unwrap(), json!("Ubuntu"));
        assert_eq!(os.property("version").unwrap(), json!("22.04"));
        assert!(os.matcher("be_debian_like").unwrap());
    }

    #[test]
    fn test_missing_file_skips() {
        let mut registry = Registry::new();
        register_embedded(&mut registry).unwrap();

        let ctx: SharedContext = Arc::new(MockContext::new());
        let os = registry
            .instantiate("os_release", None, Params::new(), ctx)
            .unwrap();
        assert!(os.is_skipped());
        assert!(os.skip_reason().unwrap().contains("/etc/os-release"));
        assert_eq!(os.property("name").unwrap(), Value::Null);
    }

    #[test]
    fn test_passwd_is_plural() {
        let mut registry = Registry::new();
        register_embedded(&mut registry).unwrap();

        let ctx: SharedContext = Arc::new(MockContext::new().with_file(
            "/etc/passwd",
            "root:x:0:0:root:/root:/bin/bash\nwww:x:33:33:www:/var/www:/usr/sbin/nologin\n",
        ));
        let users = registry.instantiate("passwd", None, Params::new(), ctx).unwrap();
        assert_eq!(users.property("count").unwrap(), json!(2));

        let root = users.filter(["uid=0".parse().unwrap()]).unwrap();
        assert_eq!(root.plural("users").unwrap(), vec![json!("root")]);
    }

    #[test]
    fn test_command_template_is_quoted() {
        let spec = ResourceSpec::from_yaml(
            r#"
name: package
identifier: name
fetch:
  command: "dpkg-query -W {name}"
format:
  type: delimited
  fields: [name, version]
predicates:
  installed?: { path: "0.name" }
properties:
  version: { path: "0.version" }
"#,
        )
        .unwrap();
        let ctor = {
            let mut registry = Registry::new();
            registry.register(spec.into_definition().unwrap()).unwrap();
            registry.resolve("package", None).unwrap()
        };

        let ctx: SharedContext = Arc::new(MockContext::new().with_command(
            "dpkg-query -W 'nginx'",
            "nginx 1.24.0-2ubuntu1\n",
            0,
        ));
        let pkg = ctor.construct(params(json!({"name": "nginx"})), ctx).unwrap();
        assert!(pkg.matcher("be_installed").unwrap());
        assert_eq!(pkg.property("version").unwrap(), json!("1.24.0-2ubuntu1"));
    }

    #[test]
    fn test_nonzero_exit_skips() {
        let spec = ResourceSpec::from_yaml(
            "name: tool\nfetch: { command: 'tool --json' }\nproperties:\n  v: { path: version }\n",
        )
        .unwrap();
        let mut registry = Registry::new();
        registry.register(spec.into_definition().unwrap()).unwrap();

        let ctx: SharedContext = Arc::new(MockContext::new().with_command("tool --json", "", 127));
        let tool = registry.instantiate("tool", None, Params::new(), ctx).unwrap();
        assert!(tool.is_skipped());
        assert!(tool.skip_reason().unwrap().contains("status 127"));
    }

    #[test]
    fn test_render_template() {
        let p = params(json!({"path": "/etc/it's", "n": 3}));
        assert_eq!(render_template("cat {path}", &p, false).unwrap(), "cat /etc/it's");
        assert_eq!(
            render_template("cat {path}", &p, true).unwrap(),
            r"cat '/etc/it'\''s'"
        );
        assert_eq!(render_template("head -{n}", &p, false).unwrap(), "head -3");
        assert!(render_template("{missing}", &p, false).is_err());
        assert!(render_template("{path", &p, false).is_err());
    }

    #[test]
    fn test_formats() {
        assert_eq!(
            Format::Lines.parse("a\n\n b \n").unwrap(),
            json!(["a", " b"])
        );
        let kv = Format::KeyValue { separator: ":".to_string() };
        assert_eq!(kv.parse("host: db\n; note\n").unwrap(), json!({"host": "db"}));

        let ps = Format::Delimited {
            delimiter: None,
            fields: vec!["pid".into(), "cmd".into()],
            header: true,
        };
        assert_eq!(
            ps.parse("PID CMD\n1 /sbin/init splash\n").unwrap(),
            json!([{"pid": "1", "cmd": "/sbin/init splash"}])
        );
        assert!(Format::Json.parse("{").is_err());
    }

    #[test]
    fn test_invalid_predicate_pattern() {
        let spec = ResourceSpec::from_yaml(
            "name: bad\nfetch: { file: /x }\npredicates:\n  ok?: { path: a, matches: '(' }\n",
        )
        .unwrap();
        assert!(matches!(
            spec.into_definition(),
            Err(ResourceError::Filter(FilterError::InvalidPattern { .. }))
        ));
    }

    #[test]
    fn test_fetch_block_forms() {
        let block = ResourceSpec::from_yaml("name: a\nfetch:\n  file: /etc/a\n").unwrap();
        assert_eq!(block.fetch, FetchSpec::File("/etc/a".to_string()));

        let flow = ResourceSpec::from_yaml("name: b\nfetch: { command: 'uname -r' }\n").unwrap();
        assert_eq!(flow.fetch, FetchSpec::Command("uname -r".to_string()));

        let json = ResourceSpec::from_json(r#"{"name": "c", "fetch": {"file": "/etc/c"}}"#).unwrap();
        assert_eq!(json.fetch, FetchSpec::File("/etc/c".to_string()));
    }

    #[test]
    fn test_boolean_property_stays_a_property() {
        let spec = ResourceSpec::from_yaml(
            "name: unit\nfetch: { file: /unit.json }\nproperties:\n  enabled: { path: enabled, kind: boolean }\npredicates:\n  active?: { path: active, equals: true }\n",
        )
        .unwrap();
        let mut registry = Registry::new();
        registry.register(spec.into_definition().unwrap()).unwrap();

        let ctx: SharedContext = Arc::new(
            MockContext::new().with_file("/unit.json", r#"{"enabled": true, "active": true}"#),
        );
        let unit = registry.instantiate("unit", None, Params::new(), ctx).unwrap();
        assert_eq!(unit.property("enabled").unwrap(), json!(true));
        assert!(matches!(
            unit.matcher("enabled"),
            Err(ResourceError::NotAMatcher { .. })
        ));
        assert!(unit.matcher("be_active").unwrap());
        assert_eq!(
            unit.members().matchers().map(|m| m.exposed_name.as_str()).collect::<Vec<_>>(),
            vec!["be_active"]
        );
    }

    #[test]
    fn test_count_shape_is_always_an_integer() {
        assert_eq!(shape(json!(["a", "b"]), ValueKind::Count), json!(2));
        assert_eq!(shape(json!({"a": 1}), ValueKind::Count), json!(1));
        assert_eq!(shape(Value::Null, ValueKind::Count), json!(0));
        assert_eq!(shape(json!("3.5"), ValueKind::Count), json!(1));
        assert_eq!(shape(json!(7.25), ValueKind::Count), json!(1));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(ResourceSpec::from_yaml("name: x\nfetch: { file: /x }\nbogus: 1\n").is_err());
    }

    #[test]
    fn test_register_dir_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("hosts.yaml"),
            "name: hosts\nfetch: { file: /etc/hosts }\nformat: { type: lines }\nproperties:\n  lines: { path: '', kind: collection }\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = Registry::new();
        assert_eq!(register_dir(&mut registry, dir.path()).unwrap(), 1);
        assert!(registry.contains("hosts"));
    }
}
