use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::manifest::{ManifestSource, VersionEntry, VersionsManifest};
use crate::core::downloader::{CacheMode, Downloader};
use crate::core::error::{PipelineError, PipelineResult};

/// Resolves a version id against an ordered list of mirrored manifests.
///
/// Every source is first probed through its cached copy; only when none of
/// them knows the version is the whole list fetched again with a forced
/// download. The resolved entry is memoised for the resolver's lifetime.
pub struct ManifestResolver {
    version: String,
    sources: Vec<ManifestSource>,
    user_cache: PathBuf,
    downloader: Arc<Downloader>,
    entry: OnceCell<VersionEntry>,
}

impl ManifestResolver {
    pub fn new(
        version: impl Into<String>,
        mut sources: Vec<ManifestSource>,
        user_cache: PathBuf,
        downloader: Arc<Downloader>,
    ) -> Self {
        // Stable sort keeps declaration order among equal priorities.
        sources.sort_by_key(|s| s.priority);
        Self {
            version: version.into(),
            sources,
            user_cache,
            downloader,
            entry: OnceCell::new(),
        }
    }

    pub async fn resolve(&self) -> PipelineResult<&VersionEntry> {
        self.entry.get_or_try_init(|| self.lookup()).await
    }

    async fn lookup(&self) -> PipelineResult<VersionEntry> {
        let mut manifests_read = 0usize;
        let mut last_error = None;

        for mode in [CacheMode::Default, CacheMode::Force] {
            for source in &self.sources {
                match self.probe(source, mode).await {
                    Ok(Some(entry)) => {
                        info!(
                            "Resolved version {} from manifest '{}'",
                            self.version, source.name
                        );
                        return Ok(entry);
                    }
                    Ok(None) => {
                        manifests_read += 1;
                        debug!(
                            "Manifest '{}' ({:?}) does not list {}",
                            source.name, mode, self.version
                        );
                    }
                    Err(e) => {
                        warn!("Manifest '{}' unavailable ({:?}): {}", source.name, mode, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) if manifests_read == 0 => Err(e),
            _ => Err(PipelineError::NotFound {
                version: self.version.clone(),
            }),
        }
    }

    async fn probe(
        &self,
        source: &ManifestSource,
        mode: CacheMode,
    ) -> PipelineResult<Option<VersionEntry>> {
        let cache_file = source.cache_file(&self.user_cache);
        let body = self
            .downloader
            .download_string(&source.url, &cache_file, mode)
            .await?;
        let manifest = VersionsManifest::parse(&body)?;
        Ok(manifest.find_version(&self.version).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, priority: i32) -> ManifestSource {
        ManifestSource {
            name: name.into(),
            url: format!("http://127.0.0.1:9/{}.json", name),
            priority,
        }
    }

    fn offline_downloader() -> Arc<Downloader> {
        Arc::new(Downloader::new(reqwest::Client::new()).offline(true))
    }

    #[tokio::test]
    async fn resolves_from_cached_manifest_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let low = source("secondary", 10);
        let high = source("primary", 0);

        std::fs::write(
            high.cache_file(dir.path()),
            r#"{"versions":[{"id":"1.0","client":{"url":"https://a/client.jar","sha256":"aa"}}]}"#,
        )
        .unwrap();
        std::fs::write(
            low.cache_file(dir.path()),
            r#"{"versions":[{"id":"1.0","client":{"url":"https://b/client.jar","sha256":"bb"}}]}"#,
        )
        .unwrap();

        let resolver = ManifestResolver::new(
            "1.0",
            vec![low, high],
            dir.path().to_path_buf(),
            offline_downloader(),
        );
        let entry = resolver.resolve().await.unwrap();
        assert_eq!(entry.client.as_ref().unwrap().url, "https://a/client.jar");
    }

    #[tokio::test]
    async fn missing_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let only = source("primary", 0);
        std::fs::write(only.cache_file(dir.path()), r#"{"versions":[]}"#).unwrap();

        let resolver =
            ManifestResolver::new("9.9", vec![only], dir.path().to_path_buf(), offline_downloader());
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { version } if version == "9.9"));
    }

    #[tokio::test]
    async fn entry_is_memoised() {
        let dir = tempfile::tempdir().unwrap();
        let only = source("primary", 0);
        let cache = only.cache_file(dir.path());
        std::fs::write(&cache, r#"{"versions":[{"id":"1.0","server":{"url":"s"}}]}"#).unwrap();

        let resolver =
            ManifestResolver::new("1.0", vec![only], dir.path().to_path_buf(), offline_downloader());
        resolver.resolve().await.unwrap();
        std::fs::remove_file(&cache).unwrap();
        assert!(resolver.resolve().await.unwrap().has_server());
    }
}
