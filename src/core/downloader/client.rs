use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::digest::Digest;
use crate::core::error::{PipelineError, PipelineResult};

/// How an existing file at the destination is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Reuse when the digest matches, or (without a digest) when the file is
    /// younger than the downloader's max age.
    Default,
    /// Always fetch again.
    Force,
    /// Never touch the network.
    Offline,
}

/// A single file to download with an optional digest for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub digest: Option<Digest>,
    pub mode: CacheMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Cached,
    Downloaded,
}

/// Concurrent, digest validated downloader.
///
/// Bytes are streamed into a unique `.part` sibling, hashed on the way, and
/// only renamed onto the destination once the digest matched. A failed
/// download therefore never leaves anything at the final path.
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    /// Freshness window for cached files that carry no digest.
    max_age: Duration,
    offline: bool,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: 2,
            max_age: Duration::from_secs(24 * 60 * 60),
            offline: false,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Force every request into `CacheMode::Offline`.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    fn effective_mode(&self, mode: CacheMode) -> CacheMode {
        if self.offline {
            CacheMode::Offline
        } else {
            mode
        }
    }

    // ── Single file download ────────────────────────────

    pub async fn download(&self, entry: &DownloadEntry) -> PipelineResult<DownloadOutcome> {
        let mode = self.effective_mode(entry.mode);
        let dest = entry.dest.as_path();

        if mode != CacheMode::Force && self.is_reusable(dest, entry.digest.as_ref(), mode).await? {
            debug!("Using cached {:?}", dest);
            return Ok(DownloadOutcome::Cached);
        }

        if mode == CacheMode::Offline {
            return Err(PipelineError::Offline {
                url: entry.url.clone(),
            });
        }

        self.fetch_verified(&entry.url, dest, entry.digest.as_ref())
            .await?;
        Ok(DownloadOutcome::Downloaded)
    }

    /// Convenience wrapper used for manifest bodies: download into
    /// `cache_path` and return the text.
    pub async fn download_string(
        &self,
        url: &str,
        cache_path: &Path,
        mode: CacheMode,
    ) -> PipelineResult<String> {
        self.download(&DownloadEntry {
            url: url.to_string(),
            dest: cache_path.to_path_buf(),
            digest: None,
            mode,
        })
        .await?;

        tokio::fs::read_to_string(cache_path)
            .await
            .map_err(|e| PipelineError::io(cache_path, e))
    }

    async fn is_reusable(
        &self,
        dest: &Path,
        digest: Option<&Digest>,
        mode: CacheMode,
    ) -> PipelineResult<bool> {
        let metadata = match tokio::fs::metadata(dest).await {
            Ok(m) => m,
            Err(_) => return Ok(false),
        };

        if let Some(digest) = digest {
            return digest.verify_file(dest).await;
        }

        if mode == CacheMode::Offline {
            return Ok(true);
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or(Duration::MAX);
        Ok(age <= self.max_age)
    }

    async fn fetch_verified(
        &self,
        url: &str,
        dest: &Path,
        digest: Option<&Digest>,
    ) -> PipelineResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let part = part_path(dest);
        let result = stream_to(response, &part, digest).await;

        let actual = match result {
            Ok(actual) => actual,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        if let (Some(expected), Some(actual)) = (digest, actual) {
            if !expected.matches(&actual) {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(PipelineError::Integrity {
                    path: dest.to_path_buf(),
                    expected: expected.hex.clone(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&part, dest).await.map_err(|e| {
            let _ = std::fs::remove_file(&part);
            PipelineError::io(dest, e)
        })?;

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files concurrently using `buffer_unordered`.
    ///
    /// Every entry is attempted; the report lists the ones that failed.
    pub async fn download_batch(&self, entries: Vec<DownloadEntry>) -> BatchReport {
        info!(
            "Starting batch download: {} files, concurrency={}",
            entries.len(),
            self.concurrency
        );

        let results: Vec<_> = stream::iter(entries)
            .map(|entry| async move {
                let result = self.download(&entry).await;
                (entry, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (entry, result) in results {
            match result {
                Ok(DownloadOutcome::Cached) => report.cached += 1,
                Ok(DownloadOutcome::Downloaded) => report.downloaded += 1,
                Err(e) => report.failures.push((entry, e)),
            }
        }
        report
    }
}

/// Result of [`Downloader::download_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub downloaded: usize,
    pub cached: usize,
    pub failures: Vec<(DownloadEntry, PipelineError)>,
}

fn part_path(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!("{}.{}.part", file_name, uuid::Uuid::new_v4()))
}

/// Streams the body into `part`, returning the hex digest when one was requested.
async fn stream_to(
    response: reqwest::Response,
    part: &Path,
    digest: Option<&Digest>,
) -> PipelineResult<Option<String>> {
    let mut hasher = digest.map(Digest::hasher);
    let mut body = response.bytes_stream();

    // Write inside a block so the handle is dropped before the rename.
    {
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| PipelineError::io(part, e))?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if let Some(h) = hasher.as_mut() {
                h.update(&chunk);
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| PipelineError::io(part, e))?;
        }

        file.flush().await.map_err(|e| PipelineError::io(part, e))?;
        file.sync_all().await.map_err(|e| PipelineError::io(part, e))?;
    }

    Ok(hasher.map(|h| h.finish_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::digest::sha256_hex;

    fn downloader() -> Downloader {
        Downloader::new(Client::new())
    }

    #[tokio::test]
    async fn reuses_file_with_matching_digest_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        tokio::fs::write(&dest, b"jar-bytes").await.unwrap();

        let entry = DownloadEntry {
            // Unroutable: any network access would fail the test.
            url: "http://127.0.0.1:9/client.jar".into(),
            dest: dest.clone(),
            digest: Some(Digest::sha256(sha256_hex(b"jar-bytes"))),
            mode: CacheMode::Default,
        };
        assert_eq!(
            downloader().download(&entry).await.unwrap(),
            DownloadOutcome::Cached
        );
    }

    #[tokio::test]
    async fn offline_without_cached_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let entry = DownloadEntry {
            url: "http://127.0.0.1:9/server.jar".into(),
            dest: dir.path().join("server.jar"),
            digest: None,
            mode: CacheMode::Default,
        };
        let err = downloader().offline(true).download(&entry).await.unwrap_err();
        assert!(matches!(err, PipelineError::Offline { .. }));
    }

    #[tokio::test]
    async fn stale_digest_forces_refetch_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        tokio::fs::write(&dest, b"corrupt").await.unwrap();

        let entry = DownloadEntry {
            url: "http://127.0.0.1:9/client.jar".into(),
            dest: dest.clone(),
            digest: Some(Digest::sha256(sha256_hex(b"expected"))),
            mode: CacheMode::Default,
        };
        // The cached copy is rejected, so the downloader goes to the network.
        assert!(downloader().download(&entry).await.is_err());
    }

    #[test]
    fn part_path_is_a_unique_sibling() {
        let a = part_path(Path::new("/cache/1.0/client.jar"));
        let b = part_path(Path::new("/cache/1.0/client.jar"));
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/cache/1.0")));
        assert!(a.to_string_lossy().ends_with(".part"));
    }
}
