//! Resource Definitions
//!
//! What a resource author writes: a descriptor, an initializer, and an
//! explicit list of declared methods. Nothing is discovered by reflection;
//! every exposed member comes from this list (plus the identifier parameter
//! and, for plural resources, the filter table members).
//!
//! ```ignore
//! let def = ResourceDefinition::new("lamp", 1, |params, ctx| Lamp::detect(params, ctx))
//!     .description("A lamp on the target")
//!     .identifier("name")
//!     .property("watts", |lamp| Ok(json!(lamp.watts)))
//!     .predicate("illuminated?", |lamp| Ok(lamp.on));
//! registry.register(def)?;
//! ```

use super::error::ResourceError;
use super::instance::ResourceInstance;
use super::naming::{derive_for_kind, MethodKind};
use super::skip::{Flow, Halt};
use crate::context::SharedContext;
use crate::filter::{ColumnSet, FilterTable, Row};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Construction parameters supplied by the caller
pub type Params = Map<String, Value>;

type InitFn<S> = Box<dyn Fn(&Params, &SharedContext) -> Flow<S> + Send + Sync>;
type MethodFn<S> = Box<dyn Fn(&S) -> Flow<Value> + Send + Sync>;
type RowsFn<S> = Box<dyn Fn(&S) -> Vec<Row> + Send + Sync>;

/// Static metadata of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Shape of a member's value; decides its neutral default once skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Scalar,
    Collection,
    Count,
    Boolean,
}

impl ValueKind {
    /// Value reported by a skipped instance
    pub fn absent(self) -> Value {
        match self {
            Self::Scalar => Value::Null,
            Self::Collection => Value::Array(Vec::new()),
            Self::Count => Value::from(0),
            Self::Boolean => Value::Bool(false),
        }
    }
}

/// A declared method: name as written, kind tag, and value shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDecl {
    pub declared_name: String,
    pub kind: MethodKind,
    pub returns: ValueKind,
}

impl MethodDecl {
    pub fn new(declared_name: &str, kind: MethodKind, returns: ValueKind) -> Self {
        Self {
            declared_name: declared_name.to_string(),
            kind,
            returns,
        }
    }
}

struct Method<S> {
    decl: MethodDecl,
    imp: MethodFn<S>,
}

struct Plural<S> {
    columns: Arc<ColumnSet>,
    rows: RowsFn<S>,
}

/// Builder for a resource whose per-instance state is `S`
pub struct ResourceDefinition<S> {
    descriptor: ResourceDescriptor,
    identifier: Option<String>,
    init: InitFn<S>,
    methods: Vec<Method<S>>,
    plural: Option<Plural<S>>,
}

impl<S: 'static> ResourceDefinition<S> {
    /// Start a definition; `init` runs once per instantiation
    pub fn new(
        name: &str,
        version: u32,
        init: impl Fn(&Params, &SharedContext) -> Flow<S> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor: ResourceDescriptor {
                name: name.to_string(),
                version,
                description: None,
                example: None,
            },
            identifier: None,
            init: Box::new(init),
            methods: Vec::new(),
            plural: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.descriptor.description = Some(description.to_string());
        self
    }

    pub fn example(mut self, example: &str) -> Self {
        self.descriptor.example = Some(example.to_string());
        self
    }

    /// Name the parameter that identifies the target; it is required and is
    /// exposed as a property that survives skipping
    pub fn identifier(mut self, param: &str) -> Self {
        self.identifier = Some(param.to_string());
        self
    }

    /// Declare a method with an explicit kind and value shape
    pub fn method(
        mut self,
        decl: MethodDecl,
        imp: impl Fn(&S) -> Flow<Value> + Send + Sync + 'static,
    ) -> Self {
        self.methods.push(Method {
            decl,
            imp: Box::new(imp),
        });
        self
    }

    /// Declare a scalar property
    pub fn property(
        self,
        name: &str,
        imp: impl Fn(&S) -> Flow<Value> + Send + Sync + 'static,
    ) -> Self {
        self.method(MethodDecl::new(name, MethodKind::Property, ValueKind::Scalar), imp)
    }

    /// Declare a property returning a list
    pub fn collection(
        self,
        name: &str,
        imp: impl Fn(&S) -> Flow<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.method(
            MethodDecl::new(name, MethodKind::Property, ValueKind::Collection),
            move |s| imp(s).map(Value::Array),
        )
    }

    /// Declare a predicate; exposed as a matcher
    pub fn predicate(
        self,
        name: &str,
        imp: impl Fn(&S) -> Flow<bool> + Send + Sync + 'static,
    ) -> Self {
        self.method(
            MethodDecl::new(name, MethodKind::Predicate, ValueKind::Boolean),
            move |s| imp(s).map(Value::Bool),
        )
    }

    /// Make this a plural resource: `rows` enumerates the collection once per
    /// instance and the columns become filterable, aggregate members
    pub fn plural(
        mut self,
        columns: ColumnSet,
        rows: impl Fn(&S) -> Vec<Row> + Send + Sync + 'static,
    ) -> Self {
        self.plural = Some(Plural {
            columns: Arc::new(columns),
            rows: Box::new(rows),
        });
        self
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Validate names and freeze into a constructor
    pub(crate) fn compile(self) -> Result<ResourceConstructor, ResourceError> {
        let members = self.build_members()?;
        let compiled = Compiled {
            def: self,
            members: Arc::new(members),
        };
        Ok(ResourceConstructor(Arc::new(compiled)))
    }

    fn build_members(&self) -> Result<Members, ResourceError> {
        let mut members = Members::new(&self.descriptor.name);

        if let Some(param) = &self.identifier {
            let decl = MethodDecl::new(param, MethodKind::Property, ValueKind::Scalar);
            members.insert(decl, MemberSource::Identifier)?;
        }

        for (index, method) in self.methods.iter().enumerate() {
            members.insert(method.decl.clone(), MemberSource::Method(index))?;
        }

        if let Some(plural) = &self.plural {
            members.insert(
                MethodDecl::new("count", MethodKind::Property, ValueKind::Count),
                MemberSource::Count,
            )?;
            members.insert(
                MethodDecl::new("entries", MethodKind::Property, ValueKind::Collection),
                MemberSource::Entries,
            )?;
            members.insert(
                MethodDecl::new("exist?", MethodKind::Predicate, ValueKind::Boolean),
                MemberSource::Exists,
            )?;
            for column in plural.columns.iter() {
                members.insert(
                    MethodDecl::new(column.plural_name(), MethodKind::Property, ValueKind::Collection),
                    MemberSource::Column(column.name().to_string()),
                )?;
            }
        }

        Ok(members)
    }
}

// =============================================================================
// Exposed members
// =============================================================================

/// Where a member's value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemberSource {
    Method(usize),
    Identifier,
    Count,
    Entries,
    Exists,
    Column(String),
}

/// An accessor as the assertion layer sees it
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    pub exposed_name: String,
    pub declared_name: String,
    pub kind: MethodKind,
    pub returns: ValueKind,
    #[serde(skip)]
    pub(crate) source: MemberSource,
}

impl Member {
    pub fn is_matcher(&self) -> bool {
        self.kind == MethodKind::Predicate
    }
}

/// Exposed members of one resource, in declaration order
#[derive(Debug, Clone)]
pub struct Members {
    resource: String,
    by_name: IndexMap<String, Member>,
}

impl Members {
    fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            by_name: IndexMap::new(),
        }
    }

    fn insert(&mut self, decl: MethodDecl, source: MemberSource) -> Result<(), ResourceError> {
        let exposed = derive_for_kind(&decl.declared_name, decl.kind)?;

        if decl.kind == MethodKind::Predicate && decl.returns != ValueKind::Boolean {
            return Err(ResourceError::KindMismatch {
                name: decl.declared_name,
                kind: decl.kind,
                returns: decl.returns,
            });
        }

        if let Some(existing) = self.by_name.get(&exposed) {
            return Err(ResourceError::DuplicateExposedName {
                resource: self.resource.clone(),
                first: existing.declared_name.clone(),
                second: decl.declared_name,
                exposed,
            });
        }

        self.by_name.insert(
            exposed.clone(),
            Member {
                exposed_name: exposed,
                declared_name: decl.declared_name,
                kind: decl.kind,
                returns: decl.returns,
                source,
            },
        );
        Ok(())
    }

    /// Look up by exposed name
    pub fn get(&self, exposed: &str) -> Option<&Member> {
        self.by_name.get(exposed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.by_name.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.by_name.keys().map(String::as_str).collect()
    }

    pub fn matchers(&self) -> impl Iterator<Item = &Member> {
        self.iter().filter(|m| m.is_matcher())
    }

    pub fn properties(&self) -> impl Iterator<Item = &Member> {
        self.iter().filter(|m| !m.is_matcher())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// =============================================================================
// Type erasure
// =============================================================================

/// Object-safe view of a compiled definition
pub(crate) trait Construct: Send + Sync {
    fn descriptor(&self) -> &ResourceDescriptor;
    fn members(&self) -> &Members;
    fn identifier(&self) -> Option<&str>;
    fn columns(&self) -> Option<Arc<ColumnSet>>;
    fn construct(
        self: Arc<Self>,
        params: Params,
        context: SharedContext,
    ) -> Result<ResourceInstance, ResourceError>;
}

/// Per-instance state bound to its definition
pub(crate) trait Bound {
    fn call(&self, index: usize) -> Flow<Value>;
}

struct Compiled<S> {
    def: ResourceDefinition<S>,
    members: Arc<Members>,
}

struct BoundState<S> {
    state: S,
    compiled: Arc<Compiled<S>>,
}

impl<S: 'static> Bound for BoundState<S> {
    fn call(&self, index: usize) -> Flow<Value> {
        let Some(method) = self.compiled.def.methods.get(index) else {
            return Err(Halt::Fail(format!("no method at index {}", index)));
        };
        (method.imp)(&self.state)
    }
}

impl<S: 'static> Construct for Compiled<S> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.def.descriptor
    }

    fn members(&self) -> &Members {
        &self.members
    }

    fn identifier(&self) -> Option<&str> {
        self.def.identifier.as_deref()
    }

    fn columns(&self) -> Option<Arc<ColumnSet>> {
        self.def.plural.as_ref().map(|p| p.columns.clone())
    }

    fn construct(
        self: Arc<Self>,
        params: Params,
        context: SharedContext,
    ) -> Result<ResourceInstance, ResourceError> {
        let name = self.def.descriptor.name.clone();
        tracing::debug!(
            "Constructing {} v{} on {}",
            name,
            self.def.descriptor.version,
            context.describe()
        );

        if let Some(param) = &self.def.identifier {
            if !params.contains_key(param) {
                return Err(ResourceError::construction(
                    &name,
                    format!("missing required parameter '{}'", param),
                ));
            }
        }

        let constructor = ResourceConstructor(self.clone());

        match (self.def.init)(&params, &context) {
            Ok(state) => {
                let table = self
                    .def
                    .plural
                    .as_ref()
                    .map(|p| FilterTable::new((p.rows)(&state), p.columns.clone()));
                let bound = Box::new(BoundState {
                    state,
                    compiled: self,
                });
                Ok(ResourceInstance::active(constructor, params, context, bound, table))
            }
            Err(Halt::Skip(reason)) => Ok(ResourceInstance::skipped(
                constructor,
                params,
                context,
                reason,
            )),
            Err(Halt::Fail(message)) => Err(ResourceError::construction(&name, message)),
            Err(Halt::Error(err)) => Err(err),
        }
    }
}

/// Handle to a registered, validated resource definition
#[derive(Clone)]
pub struct ResourceConstructor(Arc<dyn Construct>);

impl fmt::Debug for ResourceConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConstructor")
            .field("descriptor", self.descriptor())
            .field("members", &self.members().names())
            .finish()
    }
}

impl ResourceConstructor {
    pub fn descriptor(&self) -> &ResourceDescriptor {
        self.0.descriptor()
    }

    pub fn members(&self) -> &Members {
        self.0.members()
    }

    /// Name of the identifying parameter, if declared
    pub fn identifier(&self) -> Option<&str> {
        self.0.identifier()
    }

    pub fn is_plural(&self) -> bool {
        self.0.columns().is_some()
    }

    pub(crate) fn columns(&self) -> Option<Arc<ColumnSet>> {
        self.0.columns()
    }

    /// Build an instance; a skip during initialization still returns `Ok`
    pub fn construct(
        &self,
        params: Params,
        context: SharedContext,
    ) -> Result<ResourceInstance, ResourceError> {
        self.0.clone().construct(params, context)
    }
}
