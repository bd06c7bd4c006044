//! Release fixtures and an in-memory [`ReleaseChecker`].

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use module_resolver::SemanticVersion;
use module_update::{Error, ReleaseChecker, ReleaseInfo, Result};

/// A release of `version` with a `.zip` and a `.zip.sha256` asset.
pub fn release(version: &str) -> ReleaseInfo {
    let parsed = SemanticVersion::parse(version).expect("fixture version must be valid");
    ReleaseInfo {
        tag: format!("v{parsed}"),
        version: parsed,
        download_url: format!("https://releases.example.test/v{parsed}/module.zip"),
        checksum_url: format!("https://releases.example.test/v{parsed}/module.zip.sha256"),
        notes: format!("Release {parsed}"),
        published_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
        is_prerelease: false,
    }
}

#[derive(Debug, Clone)]
enum Answer {
    Release(ReleaseInfo),
    HostError(u16),
    Malformed,
}

/// Answers release lookups from a fixed table keyed by repository.
///
/// Repositories not in the table have no release.
#[derive(Debug, Default)]
pub struct StaticReleaseChecker {
    answers: Mutex<BTreeMap<String, Answer>>,
    lookups: AtomicUsize,
}

impl StaticReleaseChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(self, repository: &str, release: ReleaseInfo) -> Self {
        self.set(repository, Answer::Release(release));
        self
    }

    /// Lookups for `repository` fail with a host error of `status`.
    pub fn with_host_error(self, repository: &str, status: u16) -> Self {
        self.set(repository, Answer::HostError(status));
        self
    }

    /// Lookups for `repository` fail as an unparseable release.
    pub fn with_malformed(self, repository: &str) -> Self {
        self.set(repository, Answer::Malformed);
        self
    }

    /// Replace the answer for `repository` after construction.
    pub fn publish(&self, repository: &str, release: ReleaseInfo) {
        self.set(repository, Answer::Release(release));
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn set(&self, repository: &str, answer: Answer) {
        self.answers
            .lock()
            .unwrap()
            .insert(repository.to_string(), answer);
    }
}

#[async_trait]
impl ReleaseChecker for StaticReleaseChecker {
    async fn latest_release(&self, repository: &str) -> Result<Option<ReleaseInfo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let answer = self.answers.lock().unwrap().get(repository).cloned();
        match answer {
            None => Ok(None),
            Some(Answer::Release(release)) => Ok(Some(release)),
            Some(Answer::HostError(status)) => Err(Error::ReleaseHost {
                url: format!("https://releases.example.test/{repository}"),
                status,
            }),
            Some(Answer::Malformed) => Err(Error::InvalidRelease(format!(
                "{repository}: tag is not a version"
            ))),
        }
    }
}
