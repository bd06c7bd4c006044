//! Version and dependency resolution for platform modules.
//!
//! This crate owns the value objects every other layer keys on:
//!
//! - [`SemanticVersion`] and [`VersionConstraint`]: strict `x.y.z` versions and
//!   the `^`, `~`, `>=` and exact constraint language
//! - [`RequirementSet`] and [`Environment`]: declared requirements and the
//!   diagnostics produced when a live environment cannot satisfy them
//! - [`ModuleManifest`], [`ModuleRecord`] and [`ModuleRegistry`]: discovered
//!   modules keyed by [`ModuleName`]
//! - [`DependencyGraph`]: cycle-tolerant ordering of a batch of modules

pub mod dependency;
pub mod environment;
pub mod error;
pub mod manifest;
pub mod name;
pub mod registry;
pub mod requirements;
pub mod version;

/// The canonical filename for module manifests.
pub const MANIFEST_FILENAME: &str = "module.json";

pub use dependency::DependencyGraph;
pub use environment::Environment;
pub use error::{Error, Result};
pub use manifest::{ManifestRequirements, ModuleManifest};
pub use name::ModuleName;
pub use registry::{ModuleRecord, ModuleRegistry, ModuleStatuses};
pub use requirements::RequirementSet;
pub use version::{Satisfaction, SemanticVersion, VersionConstraint, normalize_runtime_version};
