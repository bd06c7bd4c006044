//! Shared test fixtures for the module update manager workspace.
//!
//! Dev-dependency only; never published.
//!
//! - [`site`]: [`TestSite`], a temporary modules directory with manifests
//! - [`releases`]: [`StaticReleaseChecker`] and release builders
//! - [`steps`]: [`ScriptedSteps`], an [`UpdateSteps`](module_update::UpdateSteps)
//!   double that fails on demand
//! - [`server`]: [`ReleaseServer`], a loopback release host for binary tests

pub mod releases;
pub mod server;
pub mod site;
pub mod steps;

pub use releases::{StaticReleaseChecker, release};
pub use server::{ReleaseServer, release_json};
pub use site::{ModuleFixture, TestSite};
pub use steps::ScriptedSteps;
