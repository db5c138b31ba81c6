//! inspekt - a resource framework
//!
//! Resources are versioned, named objects that inspect state on a target
//! and expose it as properties and boolean matchers. Plural resources expose
//! a filterable table of rows.
//!
//! - [`resource`] - Definitions, registry, instances, and the skip signal
//! - [`filter`] - The filter table behind plural resources
//! - [`context`] - How resources reach the target
//! - [`builtin`] - Resources shipped with the crate
//! - [`batch`] - Running many queries at once
//! - [`config`] - Persistent user configuration

pub mod batch;
pub mod builtin;
pub mod config;
pub mod context;
pub mod filter;
pub mod resource;

use anyhow::Result;
use config::Config;
use resource::Registry;

/// Version injected at compile time via INSPEKT_VERSION env var, or "dev"
pub const VERSION: &str = match option_env!("INSPEKT_VERSION") {
    Some(v) => v,
    None => "dev",
};

/// Registry with the built-in, embedded, and configured resources
pub fn build_registry(config: &Config) -> Result<Registry> {
    let mut registry = Registry::with_max_version(config.effective_max_version());
    builtin::register_builtins(&mut registry)?;
    resource::declarative::register_embedded(&mut registry)?;

    for dir in &config.resource_paths {
        if let Err(e) = resource::declarative::register_dir(&mut registry, dir) {
            tracing::warn!("{:#}", e);
        }
    }

    tracing::debug!("Registry ready with {} resources", registry.len());
    Ok(registry)
}
