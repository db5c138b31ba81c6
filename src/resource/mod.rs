//! Resource abstraction layer
//!
//! Resources are small, versioned, named objects that inspect one aspect of a
//! target and expose it through properties and boolean matchers.
//!
//! # Architecture
//!
//! - [`naming`] - Maps declared method names to exposed names (`x?` -> `be_x`)
//! - [`definition`] - The builder resource authors write, and its compiled form
//! - [`registry`] - Versioned lookup and the process-wide registry
//! - [`instance`] - A constructed resource with lazy members and skip state
//! - [`skip`] - The skip signal and the `Flow` result type
//! - [`declarative`] - Resources defined in YAML or JSON files
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new();
//! registry.register(
//!     ResourceDefinition::new("lamp", 1, |params, ctx| Lamp::detect(params, ctx))
//!         .identifier("name")
//!         .predicate("illuminated?", |lamp| Ok(lamp.on)),
//! )?;
//! let lamp = registry.instantiate("lamp", None, params, context)?;
//! assert!(lamp.matcher("be_illuminated")?);
//! ```

pub mod declarative;
pub mod definition;
pub mod error;
pub mod instance;
pub mod naming;
pub mod registry;
pub mod skip;

pub use definition::{
    Member, Members, MethodDecl, Params, ResourceConstructor, ResourceDefinition,
    ResourceDescriptor, ValueKind,
};
pub use error::ResourceError;
pub use instance::{MatcherOutcome, ResourceInstance};
pub use naming::{derive_exposed_name, MethodKind};
pub use registry::{global, Registry, MAX_API_VERSION};
pub use skip::{fail, skip, Flow, Halt, InstanceState, OrSkip};
