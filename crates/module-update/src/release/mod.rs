//! Release metadata from the release host.

mod github;

pub use github::GithubReleaseChecker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use module_resolver::SemanticVersion;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ARCHIVE_SUFFIX: &str = ".zip";
const CHECKSUM_SUFFIX: &str = ".zip.sha256";

/// A parsed release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub tag: String,
    pub version: SemanticVersion,
    /// Empty when the release carries no `.zip` asset.
    pub download_url: String,
    /// Empty when the release carries no `.zip.sha256` asset.
    pub checksum_url: String,
    pub notes: String,
    pub published_at: DateTime<Utc>,
    pub is_prerelease: bool,
}

/// Wire shape of a release-host response.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePayload {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Option<Vec<ReleaseAsset>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl ReleaseInfo {
    pub fn from_json(content: &str) -> Result<Self> {
        let payload: ReleasePayload = serde_json::from_str(content)?;
        Self::from_payload(payload)
    }

    /// Derive release info from a response payload.
    ///
    /// The tag may carry a leading `v`. Missing notes or assets fall back to
    /// empty values; a malformed tag or timestamp is an error.
    pub fn from_payload(payload: ReleasePayload) -> Result<Self> {
        let bare = payload
            .tag_name
            .strip_prefix(['v', 'V'])
            .unwrap_or(&payload.tag_name);
        let version = SemanticVersion::parse(bare).map_err(|e| {
            Error::InvalidRelease(format!("tag {:?}: {e}", payload.tag_name))
        })?;

        let published_at = payload
            .published_at
            .as_deref()
            .ok_or_else(|| {
                Error::InvalidRelease(format!("tag {:?}: missing published_at", payload.tag_name))
            })
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        Error::InvalidRelease(format!("published_at {raw:?}: {e}"))
                    })
            })?;

        let assets = payload.assets.unwrap_or_default();
        let asset_url = |suffix: &str| {
            assets
                .iter()
                .find(|a| a.name.ends_with(suffix))
                .map(|a| a.browser_download_url.clone())
                .unwrap_or_default()
        };
        let download_url = asset_url(ARCHIVE_SUFFIX);
        let checksum_url = asset_url(CHECKSUM_SUFFIX);

        Ok(Self {
            tag: payload.tag_name,
            version,
            download_url,
            checksum_url,
            notes: payload.body.unwrap_or_default(),
            published_at,
            is_prerelease: payload.prerelease,
        })
    }

    /// Compares major components only.
    pub fn is_major_upgrade_from(&self, current: &SemanticVersion) -> bool {
        self.version.major > current.major
    }

    pub fn is_newer_than(&self, current: &SemanticVersion) -> bool {
        self.version > *current
    }

    pub fn has_downloadable_assets(&self) -> bool {
        !self.download_url.is_empty()
    }

    pub fn has_checksum(&self) -> bool {
        !self.checksum_url.is_empty()
    }
}

/// Looks up the newest release of a repository on the release host.
#[async_trait]
pub trait ReleaseChecker: Send + Sync {
    /// `Ok(None)` when the repository has no (visible) release.
    async fn latest_release(&self, repository: &str) -> Result<Option<ReleaseInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const FORUM_RELEASE: &str = r#"{
        "tag_name": "v2.0.0",
        "name": "Forum 2.0",
        "body": "Breaking: new thread layout",
        "prerelease": false,
        "published_at": "2024-05-01T12:30:00Z",
        "assets": [
            {"name": "forum-2.0.0.zip.sha256", "browser_download_url": "https://example.test/forum.zip.sha256"},
            {"name": "forum-2.0.0.zip", "browser_download_url": "https://example.test/forum.zip"}
        ]
    }"#;

    #[test]
    fn parses_full_payload() {
        let release = ReleaseInfo::from_json(FORUM_RELEASE).unwrap();
        assert_eq!(release.tag, "v2.0.0");
        assert_eq!(release.version, SemanticVersion::new(2, 0, 0));
        assert_eq!(release.download_url, "https://example.test/forum.zip");
        assert_eq!(release.checksum_url, "https://example.test/forum.zip.sha256");
        assert_eq!(release.notes, "Breaking: new thread layout");
        assert_eq!(release.published_at.to_rfc3339(), "2024-05-01T12:30:00+00:00");
        assert!(release.has_downloadable_assets());
        assert!(release.has_checksum());
    }

    #[rstest]
    #[case("v1.4.2")]
    #[case("1.4.2")]
    fn tag_prefix_is_optional(#[case] tag: &str) {
        let json = format!(r#"{{"tag_name":"{tag}","published_at":"2024-01-01T00:00:00Z"}}"#);
        let release = ReleaseInfo::from_json(&json).unwrap();
        assert_eq!(release.version, SemanticVersion::new(1, 4, 2));
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let release = ReleaseInfo::from_json(
            r#"{"tag_name":"v1.0.1","published_at":"2024-01-01T00:00:00Z","body":null}"#,
        )
        .unwrap();
        assert_eq!(release.notes, "");
        assert_eq!(release.download_url, "");
        assert_eq!(release.checksum_url, "");
        assert!(!release.is_prerelease);
    }

    #[test]
    fn no_zip_asset_means_nothing_to_download() {
        let release = ReleaseInfo::from_json(
            r#"{"tag_name":"v1.0.1","published_at":"2024-01-01T00:00:00Z",
                "assets":[{"name":"source.tar.gz","browser_download_url":"https://example.test/src.tgz"}]}"#,
        )
        .unwrap();
        assert_eq!(release.download_url, "");
        assert!(!release.has_downloadable_assets());
    }

    #[rstest]
    #[case::bad_tag(r#"{"tag_name":"latest","published_at":"2024-01-01T00:00:00Z"}"#)]
    #[case::bad_timestamp(r#"{"tag_name":"v1.0.0","published_at":"yesterday"}"#)]
    #[case::no_timestamp(r#"{"tag_name":"v1.0.0"}"#)]
    fn malformed_payload_is_rejected(#[case] json: &str) {
        let err = ReleaseInfo::from_json(json).unwrap_err();
        assert!(matches!(err, Error::InvalidRelease(_)), "{err:?}");
    }

    #[rstest]
    #[case("1.0.0", true)]
    #[case("1.9.9", true)]
    #[case("2.0.0", false)]
    #[case("3.0.0", false)]
    fn major_upgrade_compares_major_only(#[case] current: &str, #[case] expected: bool) {
        let release = ReleaseInfo::from_json(FORUM_RELEASE).unwrap();
        let current = SemanticVersion::parse(current).unwrap();
        assert_eq!(release.is_major_upgrade_from(&current), expected);
    }
}
