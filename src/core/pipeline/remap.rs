use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::{JarSet, Stage, StageContext, StageOutput};
use crate::core::archive;
use crate::core::error::PipelineResult;
use crate::core::jar::{GameJar, JarKind};
use crate::core::maven::{ArtifactCoordinate, CacheStage, SlotState};
use crate::core::remap::RemappedArtifact;

const SCRATCH_DIR: &str = "remap";

/// Remaps every jar of the set into `to` and publishes the results to the
/// GLOBAL repository. The next stage reads the backup copies.
#[derive(Debug, Clone)]
pub struct RemapStage {
    from: String,
    to: String,
}

impl RemapStage {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn publish_all(
        &self,
        ctx: &StageContext,
        input: &JarSet,
        coordinates: &[ArtifactCoordinate],
    ) -> PipelineResult<()> {
        let scratch = ctx.config.working_dir().join(SCRATCH_DIR);
        let outputs: Vec<GameJar> = input
            .jars
            .iter()
            .map(|jar| {
                let name = format!("{}-{}.jar", jar.kind(), self.to);
                jar.for_path(archive::temp_sibling(&scratch.join(name)))
            })
            .collect();
        // Client-only code extends common classes, so it resolves members
        // through the freshly remapped common jar.
        let common: Vec<PathBuf> = outputs
            .iter()
            .filter(|o| o.kind() == JarKind::Common)
            .map(|o| o.path().to_path_buf())
            .collect();

        let artifacts: Vec<RemappedArtifact> = input
            .jars
            .iter()
            .zip(outputs)
            .map(|(jar, output)| {
                let classpath = if output.kind() == JarKind::ClientOnly {
                    common.clone()
                } else {
                    Vec::new()
                };
                RemappedArtifact::new(jar.path().to_path_buf(), output, &self.from, &self.to)
                    .with_classpath(classpath)
            })
            .collect();

        let outputs = ctx.remapper.remap(&artifacts)?;
        let mut result = Ok(());
        for (output, coordinate) in outputs.iter().zip(coordinates) {
            if result.is_ok() {
                result = ctx.cache.publish(output.path(), coordinate).map(|_| ());
            }
            let _ = std::fs::remove_file(output.path());
        }

        if let Err(e) = &result {
            error!("Publishing {} jars failed, invalidating slots: {}", self.to, e);
            for coordinate in coordinates {
                let _ = ctx.cache.invalidate(coordinate);
            }
        }
        result
    }
}

#[async_trait]
impl Stage for RemapStage {
    fn name(&self) -> String {
        format!("remap {} -> {}", self.from, self.to)
    }

    async fn run(&self, ctx: &StageContext, input: JarSet) -> PipelineResult<StageOutput> {
        let stage = CacheStage::Remapped {
            namespace: self.to.clone(),
        };
        let coordinates: Vec<ArtifactCoordinate> = input
            .jars
            .iter()
            .map(|jar| ctx.cache.coordinate_for(&stage, jar.kind()))
            .collect();

        let refresh = ctx.config.refresh;
        let reused = !refresh && coordinates.iter().all(|c| ctx.cache.exists(c));

        if reused {
            debug!("All {} jars already published", self.to);
        } else {
            info!(":remapping {} jars {} -> {}", input.jars.len(), self.from, self.to);
            // Complete slots are authoritative unless a refresh was asked for;
            // anything half-written is cleared before it is redone.
            for coordinate in &coordinates {
                if refresh || ctx.cache.slot_state(coordinate) != SlotState::Complete {
                    ctx.cache.invalidate(coordinate)?;
                }
            }
            self.publish_all(ctx, &input, &coordinates)?;
        }

        let jars = input
            .jars
            .iter()
            .zip(&coordinates)
            .map(|(jar, coordinate)| Ok(jar.for_path(ctx.cache.backup_jar(coordinate)?)))
            .collect::<PipelineResult<Vec<_>>>()?;

        let output = JarSet {
            jars,
            bundle: input.bundle,
            coordinates,
        };
        Ok(if reused {
            StageOutput::reused(output)
        } else {
            StageOutput::produced(output)
        })
    }
}
