//! Built-in resources
//!
//! - [`file`] - Metadata and content of a path
//! - [`local_storage`] - Storage controllers from a controller report (plural)
//! - [`processes`] - The process table (plural)

pub mod file;
pub mod local_storage;
pub mod processes;

use crate::resource::{Registry, ResourceError};

/// Register every built-in resource
pub fn register_builtins(registry: &mut Registry) -> Result<(), ResourceError> {
    registry.register(file::definition())?;
    registry.register(local_storage::definition()?)?;
    registry.register(processes::definition()?)?;
    Ok(())
}
