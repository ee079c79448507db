use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::{JarSet, Stage, StageContext, StageOutput};
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::jar::{BundleMetadata, GameJar, JarConfiguration, JarKind};
use crate::core::merge::{JarMerger, JarSplitter};
use crate::core::remap::{RemapEngine, RemappedArtifact, OFFICIAL};

pub const MERGED_JAR: &str = "merged.jar";
pub const EXTRACTED_SERVER_JAR: &str = "server-extracted.jar";
/// Split outputs get their own directory so they never meet the env-only jars.
pub const SPLIT_DIR: &str = "split";
pub const CLIENT_ONLY_JAR: &str = "client-only.jar";
pub const COMMON_JAR: &str = "common.jar";

/// Turns the downloaded jars into the working jars of the configured shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareStage;

#[async_trait]
impl Stage for PrepareStage {
    fn name(&self) -> String {
        "prepare".to_string()
    }

    async fn run(&self, ctx: &StageContext, input: JarSet) -> PipelineResult<StageOutput> {
        let config = &ctx.config;
        let working = config.working_dir();
        let refresh = config.refresh;

        let client = find(&input.jars, JarKind::Client);
        let server = match (find(&input.jars, JarKind::Server), &input.bundle) {
            (Some(bundle_jar), Some(bundle)) => {
                Some(extract(bundle, &bundle_jar, &working.join(EXTRACTED_SERVER_JAR), refresh)?)
            }
            (server, _) => server,
        };

        let (jars, reused) = match config.jar_configuration {
            JarConfiguration::Merged => {
                let (client, server) = both_sides(client, server)?;
                let dest = working.join(MERGED_JAR);
                let reused = reusable(&dest, refresh);
                if !reused {
                    merge(&client, &server, &dest, &input.jars)?;
                }
                (vec![GameJar::Merged(dest)], reused)
            }
            JarConfiguration::Split => {
                if input.bundle.is_none() {
                    return Err(PipelineError::UnsupportedConfiguration(
                        "split jars require a bundled server distribution".into(),
                    ));
                }
                let (client, server) = both_sides(client, server)?;
                let client_only = working.join(SPLIT_DIR).join(CLIENT_ONLY_JAR);
                let common = working.join(SPLIT_DIR).join(COMMON_JAR);
                let reused = reusable(&client_only, refresh) && reusable(&common, refresh);
                if !reused {
                    JarSplitter::new(config.shared_entries.iter().cloned())
                        .split(&client, &server, &client_only, &common)
                        .map_err(|e| e.into_transform("split"))?;
                }
                (vec![GameJar::Common(common), GameJar::ClientOnly(client_only)], reused)
            }
            JarConfiguration::ServerOnly => {
                let server = side(server, "server")?;
                env_only(GameJar::Server(working.join("server-only.jar")), &server, refresh)?
            }
            JarConfiguration::ClientOnly => {
                let client = side(client, "client")?;
                env_only(GameJar::Client(working.join("client-only.jar")), &client, refresh)?
            }
        };

        let output = JarSet {
            jars,
            bundle: input.bundle,
            coordinates: Vec::new(),
        };
        Ok(if reused {
            StageOutput::reused(output)
        } else {
            StageOutput::produced(output)
        })
    }
}

fn find(jars: &[GameJar], kind: JarKind) -> Option<PathBuf> {
    jars.iter()
        .find(|j| j.kind() == kind)
        .map(|j| j.path().to_path_buf())
}

fn side(jar: Option<PathBuf>, name: &str) -> PipelineResult<PathBuf> {
    jar.ok_or_else(|| PipelineError::UnsupportedConfiguration(format!("no {} jar was acquired", name)))
}

fn both_sides(client: Option<PathBuf>, server: Option<PathBuf>) -> PipelineResult<(PathBuf, PathBuf)> {
    Ok((side(client, "client")?, side(server, "server")?))
}

fn reusable(path: &Path, refresh: bool) -> bool {
    let reuse = !refresh && path.exists();
    if reuse {
        debug!("Reusing working jar {:?}", path);
    }
    reuse
}

fn extract(bundle: &BundleMetadata, jar: &Path, dest: &Path, refresh: bool) -> PipelineResult<PathBuf> {
    if !reusable(dest, refresh) {
        bundle.extract_server(jar, dest)?;
    }
    Ok(dest.to_path_buf())
}

/// A failed merge means the inputs cannot be trusted: every scratch input
/// goes along with the partial output so the next run downloads afresh.
fn merge(client: &Path, server: &Path, dest: &Path, downloads: &[GameJar]) -> PipelineResult<()> {
    let merger = JarMerger::new().with_synthetic_params_offset(true);
    if let Err(e) = merger.merge(client, server, dest) {
        error!("Merge failed, deleting merged and input jars: {}", e);
        let inputs = downloads.iter().map(|j| j.path()).chain([client, server, dest]);
        for path in inputs {
            let _ = std::fs::remove_file(path);
        }
        return Err(e.into_transform("merge"));
    }
    Ok(())
}

/// A single side only needs META-INF fixed, which an identity remap does.
fn env_only(output: GameJar, input: &Path, refresh: bool) -> PipelineResult<(Vec<GameJar>, bool)> {
    let reused = reusable(output.path(), refresh);
    if !reused {
        info!(":preparing {} jar", output.kind());
        RemapEngine::identity().remap(&[RemappedArtifact::new(
            input.to_path_buf(),
            output.clone(),
            OFFICIAL,
            OFFICIAL,
        )])?;
    }
    Ok((vec![output], reused))
}
