//! Binds `(moduleId, moduleVersion, resourceType, resourceId)` to the
//! publishing module and filters listing APIs by moduleId (spec §4.G).

pub mod error;
pub mod index;

pub use error::ModuleContextError;
pub use index::ModuleContextIndex;
