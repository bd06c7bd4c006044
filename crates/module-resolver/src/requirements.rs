//! Declared module requirements and their evaluation.
//!
//! A [`RequirementSet`] never fails to evaluate: every unmet requirement,
//! including a constraint that cannot be parsed, becomes one human-readable
//! diagnostic string.

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::manifest::ManifestRequirements;
use crate::version::{Satisfaction, normalize_runtime_version};

const RUNTIME_LABEL: &str = "PHP";
const FRAMEWORK_LABEL: &str = "Laravel";

/// Constraints a module declares on its host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSet {
    /// Constraint on the runtime version (e.g. `">=8.3"`).
    pub runtime_version: Option<String>,
    /// Constraint on the host framework version (e.g. `"^11.0"`).
    pub host_framework_version: Option<String>,
    /// Sibling modules that must be installed and enabled.
    pub required_modules: Vec<String>,
    /// Runtime extensions that must be loaded.
    pub required_extensions: Vec<String>,
}

impl RequirementSet {
    pub fn from_manifest(requires: &ManifestRequirements) -> Self {
        Self {
            runtime_version: requires.php_version.clone(),
            host_framework_version: requires.laravel_version.clone(),
            required_modules: requires.required_modules.clone(),
            required_extensions: requires.required_extensions.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runtime_version.is_none()
            && self.host_framework_version.is_none()
            && self.required_modules.is_empty()
            && self.required_extensions.is_empty()
    }

    /// Collect every unmet requirement, in declaration order: runtime
    /// version, framework version, modules, then extensions.
    pub fn unsatisfied(&self, env: &Environment) -> Vec<String> {
        let mut unmet = Vec::new();

        if let Some(constraint) = &self.runtime_version {
            unmet.extend(check_version(
                RUNTIME_LABEL,
                constraint,
                Some(env.runtime_version.as_str()),
            ));
        }

        if let Some(constraint) = &self.host_framework_version {
            unmet.extend(check_version(
                FRAMEWORK_LABEL,
                constraint,
                env.host_framework_version.as_deref(),
            ));
        }

        for module in &self.required_modules {
            if !env.has_module(module) {
                unmet.push(format!("Required module: {module}"));
            }
        }

        for extension in &self.required_extensions {
            if !env.has_extension(extension) {
                unmet.push(format!(
                    "{RUNTIME_LABEL} extension {extension} required, but none found"
                ));
            }
        }

        unmet
    }

    pub fn satisfied(&self, env: &Environment) -> bool {
        self.unsatisfied(env).is_empty()
    }
}

fn check_version(label: &str, constraint: &str, found: Option<&str>) -> Option<String> {
    let unmet = |found: &str| format!("{label} version {constraint} required, but {found} found");

    let Some(raw) = found.map(str::trim).filter(|s| !s.is_empty()) else {
        return Some(unmet("none"));
    };
    let Some(version) = normalize_runtime_version(raw) else {
        return Some(unmet(raw));
    };

    match version.check(constraint) {
        Satisfaction::Satisfied => None,
        Satisfaction::Unsatisfied => Some(unmet(raw)),
        Satisfaction::Malformed(reason) => Some(format!(
            "{label} version requirement cannot be evaluated: {reason}"
        )),
    }
}
