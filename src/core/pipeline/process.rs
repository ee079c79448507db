use async_trait::async_trait;
use tracing::{debug, info};

use super::{JarSet, Stage, StageContext, StageOutput};
use crate::core::archive;
use crate::core::error::PipelineResult;
use crate::core::jar::GameJar;
use crate::core::maven::{ArtifactCoordinate, CacheStage};
use crate::core::processor::ChainSpecs;

/// Runs the processor chain over the named jars and publishes the results
/// to the LOCAL repository under the chain hash.
#[derive(Debug, Clone)]
pub struct ProcessStage {
    specs: ChainSpecs,
}

impl ProcessStage {
    pub fn new(specs: ChainSpecs) -> Self {
        Self { specs }
    }

    /// Copy the stable named jar into the slot, process it in place, then
    /// publish. A failure leaves the slot empty.
    fn produce(
        &self,
        ctx: &StageContext,
        named: &GameJar,
        coordinate: &ArtifactCoordinate,
    ) -> PipelineResult<()> {
        ctx.cache.invalidate(coordinate)?;
        archive::copy_atomically(named.path(), &coordinate.path())?;

        let target = named.for_path(coordinate.path());
        let result = ctx
            .chain
            .process_jar(&target, &self.specs, &ctx.processor_context())
            .and_then(|()| ctx.cache.publish(target.path(), coordinate).map(|_| ()));
        if let Err(e) = result {
            let _ = ctx.cache.invalidate(coordinate);
            return Err(e);
        }

        let removed = ctx.cache.delete_similar(coordinate)?;
        if removed > 0 {
            debug!("Removed {} outdated processed files for {}", removed, named.kind());
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for ProcessStage {
    fn name(&self) -> String {
        format!("process {}", self.specs.hash())
    }

    async fn run(&self, ctx: &StageContext, input: JarSet) -> PipelineResult<StageOutput> {
        let stage = CacheStage::Processed {
            hash: self.specs.hash().to_string(),
        };
        let mut produced = false;
        let mut coordinates = Vec::with_capacity(input.jars.len());

        for named in &input.jars {
            let coordinate = ctx.cache.coordinate_for(&stage, named.kind());
            if !ctx.config.refresh && !ctx.cache.is_stale(&coordinate, Some(self.specs.hash())) {
                debug!("Processed {} jar is current: {}", named.kind(), coordinate.notation());
            } else {
                info!(":processing {} jar into {}", named.kind(), coordinate.notation());
                self.produce(ctx, named, &coordinate)?;
                produced = true;
            }
            coordinates.push(coordinate);
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
        Ok(if produced {
            StageOutput::produced(output)
        } else {
            StageOutput::reused(output)
        })
    }
}
