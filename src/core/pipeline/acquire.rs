use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info};

use super::{JarSet, Stage, StageContext, StageOutput};
use crate::core::downloader::{CacheMode, DownloadEntry};
use crate::core::error::PipelineResult;
use crate::core::jar::{BundleMetadata, GameJar};
use crate::core::version::DownloadDescriptor;

pub const CLIENT_JAR: &str = "client.jar";
pub const SERVER_JAR: &str = "server.jar";

/// Resolves the version and downloads the sides the jar configuration
/// needs into the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireStage;

fn entry(descriptor: &DownloadDescriptor, dest: PathBuf, refresh: bool) -> DownloadEntry {
    DownloadEntry {
        url: descriptor.url.clone(),
        dest,
        digest: descriptor.digest(),
        mode: if refresh { CacheMode::Force } else { CacheMode::Default },
    }
}

#[async_trait]
impl Stage for AcquireStage {
    fn name(&self) -> String {
        "acquire".to_string()
    }

    async fn run(&self, ctx: &StageContext, _input: JarSet) -> PipelineResult<StageOutput> {
        let config = &ctx.config;
        let version = ctx.resolver.resolve().await?;
        config
            .jar_configuration
            .check_sides(version.has_client(), version.has_server())?;

        let working = config.working_dir();
        let mut jars = Vec::new();
        let mut downloads = Vec::new();

        if config.jar_configuration.needs_client() {
            if let Some(client) = &version.client {
                let dest = working.join(CLIENT_JAR);
                downloads.push(entry(client, dest.clone(), config.refresh));
                jars.push(GameJar::Client(dest));
            }
        }
        if config.jar_configuration.needs_server() {
            if let Some(server) = &version.server {
                let dest = working.join(SERVER_JAR);
                downloads.push(entry(server, dest.clone(), config.refresh));
                jars.push(GameJar::Server(dest));
            }
        }

        if ctx.downloader.is_offline() {
            info!(":checking {} cached game jars for {}", downloads.len(), version.id);
        } else {
            info!(":downloading {} game jars for {}", downloads.len(), version.id);
        }
        let report = ctx.downloader.download_batch(downloads).await;

        // A failed file may not survive at its final path, not even as the
        // stale copy the download was meant to replace.
        let mut first_error = None;
        for (failed, e) in report.failures {
            error!("Download of {} failed: {}", failed.url, e);
            let _ = std::fs::remove_file(&failed.dest);
            first_error.get_or_insert(e);
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let bundle = match jars.iter().find(|j| matches!(j, GameJar::Server(_))) {
            Some(server) => BundleMetadata::from_jar(server.path())?,
            None => None,
        };
        if let Some(bundle) = &bundle {
            info!(
                "Server jar is a bundle of {} version(s) and {} libraries",
                bundle.versions.len(),
                bundle.libraries.len()
            );
        }

        let jars = JarSet {
            jars,
            bundle,
            coordinates: Vec::new(),
        };
        if report.downloaded == 0 {
            Ok(StageOutput::reused(jars))
        } else {
            Ok(StageOutput::produced(jars))
        }
    }
}
