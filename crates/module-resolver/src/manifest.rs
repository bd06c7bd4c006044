//! Module manifest parsing for `module.json` files.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "forum",
//!   "version": "1.0.0",
//!   "namespace": "Modules\\Forum",
//!   "provider": "Modules\\Forum\\Providers\\ForumServiceProvider",
//!   "description": "Discussion boards",
//!   "requires": {
//!     "php_version": ">=8.3",
//!     "laravel_version": "^11.0",
//!     "required_modules": ["auth"],
//!     "required_extensions": ["gd"]
//!   },
//!   "dependencies": ["auth"],
//!   "repository": "acme/forum-module"
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::name::ModuleName;
use crate::version::SemanticVersion;

/// A validated module manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleManifest {
    pub name: ModuleName,
    pub version: SemanticVersion,
    pub namespace: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub requires: ManifestRequirements,
    pub dependencies: Vec<ModuleName>,
    /// `owner/name` of the repository publishing this module's releases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// The `requires` block of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ManifestRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laravel_version: Option<String>,
    #[serde(default)]
    pub required_modules: Vec<String>,
    #[serde(default)]
    pub required_extensions: Vec<String>,
}

/// Wire shape; required fields are optional here so their absence can be
/// reported by name.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    namespace: Option<String>,
    provider: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    requires: Option<ManifestRequirements>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    repository: Option<String>,
}

impl ModuleManifest {
    /// Parse and validate a manifest from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(content)?;

        let name = ModuleName::new(required(raw.name, "name")?)?;
        let version = SemanticVersion::parse(&required(raw.version, "version")?)?;
        let namespace = required(raw.namespace, "namespace")?;
        let provider = required(raw.provider, "provider")?;

        let dependencies = raw
            .dependencies
            .into_iter()
            .map(ModuleName::new)
            .collect::<Result<Vec<_>>>()?;

        if let Some(repo) = &raw.repository
            && !is_repository_slug(repo)
        {
            tracing::warn!(
                module = %name,
                repository = %repo,
                "Ignoring repository that is not in owner/name form"
            );
        }

        Ok(Self {
            name,
            version,
            namespace,
            provider,
            description: raw.description,
            author: raw.author,
            requires: raw.requires.unwrap_or_default(),
            dependencies,
            repository: raw.repository.filter(|r| is_repository_slug(r)),
        })
    }

    /// Read and parse a manifest from a file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }
        let content = module_fs::io::read_text(path)?;
        Self::from_json(&content)
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(Error::MissingField { field })
}

fn is_repository_slug(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const FORUM_JSON: &str = r#"{
        "name": "forum",
        "version": "1.0.0",
        "namespace": "Modules\\Forum",
        "provider": "Modules\\Forum\\Providers\\ForumServiceProvider",
        "description": "Discussion boards",
        "author": "Platform Team",
        "requires": {
            "php_version": ">=8.3",
            "laravel_version": "^11.0",
            "required_modules": ["auth"],
            "required_extensions": ["gd", "imagick"]
        },
        "dependencies": ["auth"],
        "repository": "acme/forum-module"
    }"#;

    #[test]
    fn parse_full_manifest() {
        let manifest = ModuleManifest::from_json(FORUM_JSON).unwrap();

        assert_eq!(manifest.name.as_str(), "forum");
        assert_eq!(manifest.version, SemanticVersion::new(1, 0, 0));
        assert_eq!(manifest.namespace, "Modules\\Forum");
        assert_eq!(manifest.description.as_deref(), Some("Discussion boards"));
        assert_eq!(manifest.requires.php_version.as_deref(), Some(">=8.3"));
        assert_eq!(manifest.requires.required_extensions, vec!["gd", "imagick"]);
        assert_eq!(manifest.dependencies, vec![ModuleName::new("auth").unwrap()]);
        assert_eq!(manifest.repository.as_deref(), Some("acme/forum-module"));
    }

    #[test]
    fn parse_minimal_manifest() {
        let manifest = ModuleManifest::from_json(
            r#"{"name":"auth","version":"2.1.0","namespace":"Modules\\Auth","provider":"AuthProvider"}"#,
        )
        .unwrap();

        assert_eq!(manifest.requires, ManifestRequirements::default());
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.repository.is_none());
    }

    #[rstest]
    #[case::name(r#"{"version":"1.0.0","namespace":"N","provider":"P"}"#, "name")]
    #[case::version(r#"{"name":"forum","namespace":"N","provider":"P"}"#, "version")]
    #[case::namespace(r#"{"name":"forum","version":"1.0.0","provider":"P"}"#, "namespace")]
    #[case::provider(r#"{"name":"forum","version":"1.0.0","namespace":"N"}"#, "provider")]
    #[case::blank_provider(r#"{"name":"forum","version":"1.0.0","namespace":"N","provider":"  "}"#, "provider")]
    fn missing_required_field_is_named(#[case] json: &str, #[case] field: &str) {
        let err = ModuleManifest::from_json(json).unwrap_err();
        assert!(
            matches!(err, Error::MissingField { field: f } if f == field),
            "expected MissingField({field}), got {err:?}"
        );
        assert!(err.to_string().contains(field));
    }

    #[test]
    fn invalid_version_is_rejected() {
        let err = ModuleManifest::from_json(
            r#"{"name":"forum","version":"1.0","namespace":"N","provider":"P"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }));
    }

    #[test]
    fn invalid_dependency_name_is_rejected() {
        let err = ModuleManifest::from_json(
            r#"{"name":"forum","version":"1.0.0","namespace":"N","provider":"P","dependencies":["Auth"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidName { ref name, .. } if name == "Auth"));
    }

    #[test]
    fn malformed_repository_is_dropped() {
        let manifest = ModuleManifest::from_json(
            r#"{"name":"forum","version":"1.0.0","namespace":"N","provider":"P","repository":"not-a-slug"}"#,
        )
        .unwrap();
        assert!(manifest.repository.is_none());
    }

    #[test]
    fn from_path_not_found() {
        let err = ModuleManifest::from_path(Path::new("/nonexistent/module.json")).unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound(_)));
    }
}
