//! Resource Instance
//!
//! A constructed resource bound to its parameters and a shared execution
//! context. Members are evaluated on demand; nothing is cached except the
//! rows a plural resource enumerated at construction.
//!
//! Once skipped, an instance stays skipped and every accessor answers with
//! the neutral value for its shape, except the identifier, which always
//! reports the parameter the instance was built with.

use super::definition::{
    Bound, Member, MemberSource, Members, Params, ResourceConstructor, ResourceDescriptor,
};
use super::error::ResourceError;
use super::naming::MethodKind;
use super::skip::{Halt, InstanceState};
use crate::context::SharedContext;
use crate::filter::{Comparison, FilterTable};
use serde::Serialize;
use serde_json::Value;
use std::cell::OnceCell;
use std::fmt;

/// Result of evaluating one matcher, for the assertion layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatcherOutcome {
    pub resource: String,
    pub matcher: String,
    pub passed: bool,
    pub skipped: bool,
    pub description: String,
}

/// A resource bound to parameters and a context
pub struct ResourceInstance {
    constructor: ResourceConstructor,
    params: Params,
    context: SharedContext,
    bound: Option<Box<dyn Bound>>,
    table: Option<FilterTable>,
    skip_reason: OnceCell<String>,
}

impl fmt::Debug for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceInstance")
            .field("resource", &self.descriptor().name)
            .field("version", &self.descriptor().version)
            .field("params", &self.params)
            .field("state", &self.state())
            .field("skip_reason", &self.skip_reason.get())
            .finish()
    }
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.descriptor().name;
        match self.identifier() {
            Some(Value::String(id)) => write!(f, "{}({})", name, id),
            Some(Value::Null) | None => write!(f, "{}", name),
            Some(other) => write!(f, "{}({})", name, other),
        }
    }
}

impl ResourceInstance {
    pub(crate) fn active(
        constructor: ResourceConstructor,
        params: Params,
        context: SharedContext,
        bound: Box<dyn Bound>,
        table: Option<FilterTable>,
    ) -> Self {
        Self {
            constructor,
            params,
            context,
            bound: Some(bound),
            table,
            skip_reason: OnceCell::new(),
        }
    }

    pub(crate) fn skipped(
        constructor: ResourceConstructor,
        params: Params,
        context: SharedContext,
        reason: String,
    ) -> Self {
        let instance = Self {
            constructor,
            params,
            context,
            bound: None,
            table: None,
            skip_reason: OnceCell::new(),
        };
        instance.skip(reason);
        instance
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        self.constructor.descriptor()
    }

    pub fn members(&self) -> &Members {
        self.constructor.members()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn state(&self) -> InstanceState {
        if self.skip_reason.get().is_some() {
            InstanceState::Skipped
        } else {
            InstanceState::Active
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.state() == InstanceState::Skipped
    }

    /// Why the instance was skipped; `None` while active
    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.get().map(String::as_str)
    }

    /// Mark the instance as not applicable. The first reason wins; later
    /// calls are no-ops.
    pub fn skip(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.skip_reason.get().is_some() {
            tracing::debug!("{} already skipped, ignoring: {}", self, reason);
            return;
        }
        tracing::info!("{} skipped: {}", self, reason);
        let _ = self.skip_reason.set(reason);
    }

    /// The identifying parameter, verbatim, regardless of state
    pub fn identifier(&self) -> Option<&Value> {
        let param = self.constructor.identifier()?;
        Some(self.params.get(param).unwrap_or(&Value::Null))
    }

    fn member(&self, name: &str) -> Result<&Member, ResourceError> {
        self.members()
            .get(name)
            .ok_or_else(|| ResourceError::UnknownMember {
                resource: self.descriptor().name.clone(),
                member: name.to_string(),
            })
    }

    /// Evaluate a property (or a matcher, as a JSON boolean) by exposed name
    pub fn property(&self, name: &str) -> Result<Value, ResourceError> {
        let member = self.member(name)?;

        if member.source == MemberSource::Identifier {
            return Ok(self.identifier().cloned().unwrap_or(Value::Null));
        }

        if self.is_skipped() {
            return Ok(member.returns.absent());
        }

        match self.evaluate(member) {
            Ok(value) => Ok(value),
            Err(Halt::Skip(reason)) => {
                self.skip(reason);
                Ok(member.returns.absent())
            }
            Err(Halt::Fail(message)) => Err(ResourceError::Evaluation {
                resource: self.descriptor().name.clone(),
                member: name.to_string(),
                message,
            }),
            Err(Halt::Error(err)) => Err(err),
        }
    }

    fn evaluate(&self, member: &Member) -> Result<Value, Halt> {
        match &member.source {
            MemberSource::Method(index) => {
                let Some(bound) = &self.bound else {
                    return Err(Halt::Skip("resource state unavailable".to_string()));
                };
                bound.call(*index)
            }
            MemberSource::Identifier => Ok(self.identifier().cloned().unwrap_or(Value::Null)),
            MemberSource::Count => Ok(Value::from(self.table()?.count())),
            MemberSource::Entries => Ok(Value::Array(self.table()?.to_values())),
            MemberSource::Exists => Ok(Value::Bool(self.table()?.exists())),
            MemberSource::Column(column) => Ok(Value::Array(self.table()?.values(column)?)),
        }
    }

    /// Evaluate a matcher by exposed name; `false` once skipped
    pub fn matcher(&self, name: &str) -> Result<bool, ResourceError> {
        let member = self.member(name)?;
        if member.kind != MethodKind::Predicate {
            return Err(ResourceError::NotAMatcher {
                resource: self.descriptor().name.clone(),
                member: name.to_string(),
            });
        }

        match self.property(name)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(ResourceError::Evaluation {
                resource: self.descriptor().name.clone(),
                member: name.to_string(),
                message: format!("expected a boolean, got {}", other),
            }),
        }
    }

    /// Evaluate a matcher with a human-readable description
    pub fn check(&self, name: &str) -> Result<MatcherOutcome, ResourceError> {
        let passed = self.matcher(name)?;
        Ok(MatcherOutcome {
            resource: self.to_string(),
            matcher: name.to_string(),
            passed,
            skipped: self.is_skipped(),
            description: format!("{} should {}", self, name.replace('_', " ")),
        })
    }

    pub fn is_plural(&self) -> bool {
        self.constructor.is_plural()
    }

    /// The full filter table; empty once skipped
    pub fn table(&self) -> Result<FilterTable, ResourceError> {
        let Some(columns) = self.constructor.columns() else {
            return Err(ResourceError::NotPlural(self.descriptor().name.clone()));
        };

        if self.is_skipped() {
            return Ok(FilterTable::empty(columns));
        }

        Ok(self
            .table
            .clone()
            .unwrap_or_else(|| FilterTable::empty(columns)))
    }

    /// Filtered view of a plural resource (`where` in the resource DSL)
    pub fn filter<I>(&self, criteria: I) -> Result<FilterTable, ResourceError>
    where
        I: IntoIterator<Item = Comparison>,
    {
        Ok(self.table()?.filter(criteria)?)
    }
}
