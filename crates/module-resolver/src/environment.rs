//! Live environment snapshots used to evaluate module requirements.

use std::collections::BTreeSet;
use std::process::Command;

use crate::error::{Error, Result};

/// A point-in-time view of the host a module would run on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Free-form runtime version string (e.g. `"8.3.0-dev"`).
    pub runtime_version: String,
    /// Host framework version, if known.
    pub host_framework_version: Option<String>,
    /// Names of modules that are installed and enabled.
    pub available_modules: BTreeSet<String>,
    /// Loaded runtime extensions, lowercased.
    pub available_extensions: BTreeSet<String>,
}

impl Environment {
    pub fn new(runtime_version: impl Into<String>) -> Self {
        Self {
            runtime_version: runtime_version.into(),
            ..Self::default()
        }
    }

    pub fn with_framework_version(mut self, version: impl Into<String>) -> Self {
        self.host_framework_version = Some(version.into());
        self
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.available_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.available_modules.contains(name)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.available_extensions
            .contains(&name.to_ascii_lowercase())
    }

    /// Query the runtime binary for its version and loaded extensions.
    ///
    /// Runs `<binary> -r "echo PHP_VERSION;"` and `<binary> -m`. Module names
    /// are not detected; callers add the registry's enabled modules
    /// with [`Environment::with_modules`].
    pub fn detect(binary: &str, framework_version: Option<&str>) -> Result<Self> {
        let version = run_detection(binary, &["-r", "echo PHP_VERSION;"])?;
        let extensions = run_detection(binary, &["-m"])?;

        let mut env = Self::new(version.trim()).with_extensions(parse_extension_list(&extensions));
        if let Some(framework) = framework_version {
            env = env.with_framework_version(framework);
        }
        tracing::debug!(
            runtime = %env.runtime_version,
            extensions = env.available_extensions.len(),
            "Detected runtime environment"
        );
        Ok(env)
    }
}

fn run_detection(binary: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(binary)
        .args(args)
        .output()
        .map_err(|e| Error::EnvironmentDetection {
            binary: binary.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::EnvironmentDetection {
            binary: binary.to_string(),
            reason: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `php -m` output, skipping the `[PHP Modules]` style section headers.
fn parse_extension_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('['))
        .map(str::to_ascii_lowercase)
        .collect()
}
