//! GitHub Releases client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};

use super::{ReleaseChecker, ReleaseInfo, ReleasePayload};
use crate::config::ReleaseConfig;
use crate::error::{Error, Result};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Looks up releases through the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubReleaseChecker {
    client: reqwest::Client,
    api_base: String,
    allow_prerelease: bool,
}

impl GithubReleaseChecker {
    pub fn new(config: &ReleaseConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));

        let token = config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.trim().is_empty());
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {}", token.trim())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Ignoring API token with invalid characters"),
            }
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            allow_prerelease: config.allow_prerelease,
        })
    }

    /// `GET` a JSON document; `Ok(None)` on 404.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        tracing::debug!(url, "Querying release host");
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(Error::ReleaseHost {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl ReleaseChecker for GithubReleaseChecker {
    async fn latest_release(&self, repository: &str) -> Result<Option<ReleaseInfo>> {
        let payload = if self.allow_prerelease {
            // `/releases/latest` never returns prereleases
            let url = format!("{}/repos/{repository}/releases?per_page=10", self.api_base);
            self.get_json::<Vec<ReleasePayload>>(&url)
                .await?
                .and_then(|releases| releases.into_iter().find(|r| !r.draft))
        } else {
            let url = format!("{}/repos/{repository}/releases/latest", self.api_base);
            self.get_json::<ReleasePayload>(&url).await?
        };

        payload.map(ReleaseInfo::from_payload).transpose()
    }
}
