//! FHIR R4 resource construction and bundle validation.

pub mod builder;
pub mod bundle;
pub mod types;

pub use builder::build_resources;
pub use bundle::{assemble, validate, BundleValidation};
pub use types::{FhirBundle, FhirResource, Reference};
