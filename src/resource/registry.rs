//! Resource Registry
//!
//! Stores validated resource definitions keyed by name and version and
//! resolves a request to the newest version the caller can accept.
//!
//! A process-wide registry is available through [`global`]. It is installed
//! once with [`global::init`] before any query runs and is read-only
//! afterwards; registering while queries are in flight is not supported.

use super::definition::{
    Members, Params, ResourceConstructor, ResourceDefinition, ResourceDescriptor,
};
use super::error::ResourceError;
use super::instance::ResourceInstance;
use crate::context::SharedContext;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Newest resource API generation this runtime understands
pub const MAX_API_VERSION: u32 = 2;

/// Table of resource constructors keyed by `(name, version)`
#[derive(Debug)]
pub struct Registry {
    max_version: u32,
    resources: IndexMap<String, BTreeMap<u32, ResourceConstructor>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_max_version(MAX_API_VERSION)
    }

    /// Registry accepting API versions `1..=max_version`
    pub fn with_max_version(max_version: u32) -> Self {
        Self {
            max_version,
            resources: IndexMap::new(),
        }
    }

    pub fn max_version(&self) -> u32 {
        self.max_version
    }

    /// Validate and store a definition. Re-registering a name and version
    /// replaces the earlier definition.
    pub fn register<S: 'static>(&mut self, definition: ResourceDefinition<S>) -> Result<(), ResourceError> {
        let descriptor = definition.descriptor();
        if descriptor.version == 0 || descriptor.version > self.max_version {
            return Err(ResourceError::VersionUnsupported {
                name: descriptor.name.clone(),
                version: descriptor.version,
                max: self.max_version,
            });
        }

        let constructor = definition.compile()?;
        let name = constructor.descriptor().name.clone();
        let version = constructor.descriptor().version;

        let versions = self.resources.entry(name.clone()).or_default();
        if versions.insert(version, constructor).is_some() {
            tracing::warn!(
                "Resource {} v{} registered again; previous definition replaced",
                name,
                version
            );
        } else {
            tracing::debug!("Registered resource {} v{}", name, version);
        }

        Ok(())
    }

    /// Newest constructor with version <= `requested` (newest overall if `None`)
    pub fn resolve(&self, name: &str, requested: Option<u32>) -> Result<ResourceConstructor, ResourceError> {
        let Some(versions) = self.resources.get(name) else {
            return Err(ResourceError::UnknownResource(name.to_string()));
        };

        let found = match requested {
            Some(max) => versions.range(..=max).next_back(),
            None => versions.iter().next_back(),
        };

        match found {
            Some((version, constructor)) => {
                tracing::debug!("Resolved {} (requested {:?}) to v{}", name, requested, version);
                Ok(constructor.clone())
            }
            None => Err(ResourceError::NoCompatibleVersion {
                name: name.to_string(),
                requested: requested.unwrap_or_default(),
                available: versions.keys().copied().collect(),
            }),
        }
    }

    /// Resolve and construct in one step
    pub fn instantiate(
        &self,
        name: &str,
        version: Option<u32>,
        params: Params,
        context: SharedContext,
    ) -> Result<ResourceInstance, ResourceError> {
        self.resolve(name, version)?.construct(params, context)
    }

    /// Descriptors of every registered version, grouped by name
    pub fn descriptors(&self) -> Vec<&ResourceDescriptor> {
        self.resources
            .values()
            .flat_map(|versions| versions.values().map(ResourceConstructor::descriptor))
            .collect()
    }

    /// Exposed members of the resolved version
    pub fn members(&self, name: &str, version: Option<u32>) -> Result<Members, ResourceError> {
        Ok(self.resolve(name, version)?.members().clone())
    }

    /// Registered resource names (for autocomplete)
    pub fn names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    pub fn versions(&self, name: &str) -> Vec<u32> {
        self.resources
            .get(name)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Number of distinct resource names
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// The process-wide registry
pub mod global {
    use super::*;
    use std::sync::{PoisonError, RwLock};

    static REGISTRY: RwLock<Option<Registry>> = RwLock::new(None);

    /// Install the process-wide registry, returning the one it replaces
    pub fn init(registry: Registry) -> Option<Registry> {
        let mut slot = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        let previous = slot.replace(registry);
        if previous.is_some() {
            tracing::warn!("Global resource registry re-initialized");
        }
        previous
    }

    /// Remove the process-wide registry
    pub fn teardown() -> Option<Registry> {
        REGISTRY
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_initialized() -> bool {
        REGISTRY
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run `f` against the installed registry
    pub fn with_registry<R>(f: impl FnOnce(&Registry) -> R) -> Result<R, ResourceError> {
        let slot = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(registry) => Ok(f(registry)),
            None => Err(ResourceError::RegistryUninitialized),
        }
    }

    /// Instantiate through the installed registry
    pub fn instantiate(
        name: &str,
        version: Option<u32>,
        params: Params,
        context: SharedContext,
    ) -> Result<ResourceInstance, ResourceError> {
        with_registry(|registry| registry.instantiate(name, version, params, context))?
    }
}
