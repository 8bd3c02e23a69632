// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Content hashes for locked packages.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha512};

use crate::Config;

#[cfg(test)]
#[path = "./hashes_test.rs"]
mod hashes_test;

/// Digest algorithm recorded in lock files.
pub const HASH_ALGORITHM: &str = "sha512";

/// Looks up the published content hashes of an exact package release.
#[async_trait]
pub trait HashResolver: Send + Sync {
    /// Hashes of every artifact of `package==version` usable by `python`,
    /// sorted and deduplicated.
    async fn hashes(&self, package: &str, version: &str, python: &str)
    -> crate::Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    urls: Vec<ReleaseFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseFile {
    filename: String,
    url: String,
    python_version: String,
    #[serde(default)]
    digests: BTreeMap<String, String>,
}

/// Resolver backed by the package index JSON API.
///
/// The index only publishes sha256 digests, so sha512 digests are computed by
/// downloading each matching artifact.
#[derive(Debug, Clone)]
pub struct PypiHashResolver {
    client: Client,
    index_url: String,
}

impl PypiHashResolver {
    pub fn new(config: &Config) -> crate::Result<Self> {
        let client = Client::builder()
            .user_agent(format!("pipy/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            index_url: config.index_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_release(&self, package: &str, version: &str) -> crate::Result<ReleaseResponse> {
        let url = format!("{}/{package}/{version}/json", self.index_url);
        tracing::debug!(%url, "fetching release metadata");

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(lookup_error(package, version, "release not found on the package index"));
        }
        let response = response
            .error_for_status()
            .map_err(|err| lookup_error(package, version, err.to_string()))?;
        Ok(response.json::<ReleaseResponse>().await?)
    }

    async fn file_hash(&self, file: &ReleaseFile) -> crate::Result<String> {
        if let Some(digest) = file.digests.get(HASH_ALGORITHM) {
            return Ok(digest.to_lowercase());
        }
        tracing::debug!(filename = %file.filename, "downloading to compute {HASH_ALGORITHM}");
        let bytes = self
            .client
            .get(&file.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(sha512_hex(&bytes))
    }
}

#[async_trait]
impl HashResolver for PypiHashResolver {
    async fn hashes(
        &self,
        package: &str,
        version: &str,
        python: &str,
    ) -> crate::Result<Vec<String>> {
        let release = self.fetch_release(package, version).await?;
        let files = matching_files(&release.urls, python);
        if files.is_empty() {
            return Err(lookup_error(
                package,
                version,
                format!("no release files for Python {python}"),
            ));
        }

        let mut hashes = BTreeSet::new();
        for file in files {
            hashes.insert(self.file_hash(file).await?);
        }
        Ok(hashes.into_iter().collect())
    }
}

fn lookup_error(package: &str, version: &str, reason: impl Into<String>) -> crate::Error {
    crate::Error::HashLookup {
        package: package.to_string(),
        version: version.to_string(),
        reason: reason.into(),
    }
}

fn matching_files<'a>(files: &'a [ReleaseFile], python: &str) -> Vec<&'a ReleaseFile> {
    let tags = python_tags(python);
    files
        .iter()
        .filter(|file| tags.contains(&file.python_version))
        .collect()
}

/// Every `python_version` label the index may use for files compatible
/// with an interpreter version.
///
/// `3.9` expands to `3.9`, `cp39`, `py3`, `py3.9`, `py39`, `source` and
/// `py2.py3`. Anything not shaped like `X.Y` only matches itself.
pub fn python_tags(version: &str) -> BTreeSet<String> {
    let shaped = version.split_once('.').filter(|(major, minor)| {
        major.len() == 1
            && (1..=2).contains(&minor.len())
            && major.chars().chain(minor.chars()).all(|c| c.is_ascii_digit())
    });

    let Some((major, minor)) = shaped else {
        return BTreeSet::from([version.to_string()]);
    };

    BTreeSet::from([
        format!("{major}.{minor}"),
        format!("cp{major}{minor}"),
        format!("py{major}"),
        format!("py{major}.{minor}"),
        format!("py{major}{minor}"),
        "source".to_string(),
        "py2.py3".to_string(),
    ])
}

/// Lowercase hex sha512 of `bytes`.
pub fn sha512_hex(bytes: &[u8]) -> String {
    hex::encode(Sha512::digest(bytes))
}
