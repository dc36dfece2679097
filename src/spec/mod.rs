//! Build-time compilation of route shapes.
//!
//! [`schema`] flattens a structural type description into a field schema,
//! [`annotation`] parses the field directives in its comment, [`sources`]
//! buckets each field by transport, and [`build`] assembles everything into
//! [`RouteDescriptor`]s. [`load`] reads route manifests from disk.

pub mod annotation;
mod build;
mod load;
pub mod schema;
pub mod sources;
mod types;

pub use build::*;
pub use load::*;
pub use types::*;
