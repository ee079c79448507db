// ─── Versions Manifest ───
// Wire format of the mirrored version manifests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::downloader::Digest;

/// One mirrored manifest location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestSource {
    pub name: String,
    pub url: String,
    /// Lower values are probed first.
    #[serde(default)]
    pub priority: i32,
}

impl ManifestSource {
    /// Stable per-source cache path for the downloaded manifest body.
    pub fn cache_file(&self, user_cache: &Path) -> PathBuf {
        let safe: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        user_cache.join(format!("{}_versions_manifest.json", safe))
    }
}

/// Top-level versions manifest.
#[derive(Debug, Deserialize)]
pub struct VersionsManifest {
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VersionEntry {
    pub id: String,
    #[serde(default)]
    pub client: Option<DownloadDescriptor>,
    #[serde(default)]
    pub server: Option<DownloadDescriptor>,
}

/// Where to fetch one side of a release and how to check it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    #[serde(default, alias = "digest")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl DownloadDescriptor {
    /// Preferred digest: SHA-256 when published, SHA-1 otherwise.
    pub fn digest(&self) -> Option<Digest> {
        self.sha256
            .as_deref()
            .map(Digest::sha256)
            .or_else(|| self.sha1.as_deref().map(Digest::sha1))
    }
}

impl VersionsManifest {
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Find a specific version entry by ID (e.g. "0.1.40").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }
}

impl VersionEntry {
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn has_server(&self) -> bool {
        self.server.is_some()
    }
}
