// ─── Provisioning Pipeline ───
// An explicit, ordered list of stages sharing one `JarSet -> JarSet`
// contract. The runner threads the set through them and records whether
// each stage reused cached output or produced new files.
//
//   acquire   resolve the version, download client/server, scan bundles
//   prepare   merge, split or env-only pass into working jars
//   remap     official → intermediary → named, published GLOBAL
//   process   processor chain, published LOCAL under the chain hash

mod acquire;
mod prepare;
mod process;
mod remap;

pub use acquire::AcquireStage;
pub use prepare::PrepareStage;
pub use process::ProcessStage;
pub use remap::RemapStage;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::config::PipelineConfig;
use crate::core::downloader::Downloader;
use crate::core::error::PipelineResult;
use crate::core::http::build_http_client;
use crate::core::jar::{BundleMetadata, GameJar};
use crate::core::maven::{ArtifactCache, ArtifactCoordinate};
use crate::core::processor::{
    open_mod, AccessWidenerProcessor, ChainSpecs, ModSource, Processor, ProcessorChain,
    ProcessorContext, ReaderRegistry,
};
use crate::core::remap::{Mappings, RemapEngine, INTERMEDIARY, NAMED, OFFICIAL};
use crate::core::version::ManifestResolver;

/// Jars handed from one stage to the next.
#[derive(Debug, Clone, Default)]
pub struct JarSet {
    /// Files the next stage reads.
    pub jars: Vec<GameJar>,
    /// Set by acquisition when the server download is a bundle.
    pub bundle: Option<BundleMetadata>,
    /// Published slots, index-aligned with `jars` once a remap has run.
    pub coordinates: Vec<ArtifactCoordinate>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Every output was already cached.
    Reused,
    Produced,
}

pub struct StageOutput {
    pub jars: JarSet,
    pub outcome: StageOutcome,
}

impl StageOutput {
    pub fn reused(jars: JarSet) -> Self {
        Self {
            jars,
            outcome: StageOutcome::Reused,
        }
    }

    pub fn produced(jars: JarSet) -> Self {
        Self {
            jars,
            outcome: StageOutcome::Produced,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub outcome: StageOutcome,
    pub elapsed_ms: i64,
}

/// A published jar and the coordinate a build declares to depend on it.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedJar {
    pub jar: GameJar,
    pub notation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionResult {
    pub version: String,
    pub jars: Vec<PublishedJar>,
    pub report: Vec<StageReport>,
    pub started_at: DateTime<Utc>,
}

impl ProvisionResult {
    pub fn dependencies(&self) -> Vec<&str> {
        self.jars.iter().map(|p| p.notation.as_str()).collect()
    }

    /// Whether no stage had to produce anything.
    pub fn fully_cached(&self) -> bool {
        self.report.iter().all(|r| r.outcome == StageOutcome::Reused)
    }
}

/// Everything stages share for one run.
pub struct StageContext {
    pub config: PipelineConfig,
    pub downloader: Arc<Downloader>,
    pub resolver: ManifestResolver,
    pub cache: ArtifactCache,
    pub remapper: RemapEngine,
    pub chain: ProcessorChain,
    pub mods: Vec<Box<dyn ModSource>>,
    pub registry: ReaderRegistry,
}

impl StageContext {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;

        let downloader = Arc::new(
            Downloader::new(build_http_client()?)
                .with_concurrency(config.download_concurrency)
                .with_max_age(config.manifest_max_age())
                .offline(config.offline),
        );
        let resolver = ManifestResolver::new(
            config.version.clone(),
            config.manifest_sources.clone(),
            config.user_cache.clone(),
            downloader.clone(),
        );
        let cache = ArtifactCache::new(
            &config.group,
            &config.artifact,
            &config.version,
            config.global_repository(),
            config.local_repository(),
        );

        let mappings = match &config.mappings {
            Some(path) => Some(Arc::new(Mappings::load(path)?)),
            None => None,
        };
        let chain = ProcessorChain::new(vec![Processor::AccessWidener(
            AccessWidenerProcessor::new(config.access_widener.clone()),
        )]);
        let mods: Vec<Box<dyn ModSource>> = config.mods.iter().map(|p| open_mod(p)).collect();

        let remapper = RemapEngine::new(mappings);
        if !remapper.has_mappings() {
            warn!("No mappings configured, remapping keeps official names");
        }

        Ok(Self {
            config,
            downloader,
            resolver,
            cache,
            remapper,
            chain,
            mods,
            registry: ReaderRegistry::default(),
        })
    }

    pub fn processor_context(&self) -> ProcessorContext<'_> {
        ProcessorContext::new(self.config.jar_configuration, &self.mods, &self.registry)
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> String;

    async fn run(&self, ctx: &StageContext, input: JarSet) -> PipelineResult<StageOutput>;
}

/// Dispatcher without Box<dyn>.
pub enum PipelineStage {
    Acquire(AcquireStage),
    Prepare(PrepareStage),
    Remap(RemapStage),
    Process(ProcessStage),
}

impl PipelineStage {
    pub fn name(&self) -> String {
        match self {
            PipelineStage::Acquire(s) => s.name(),
            PipelineStage::Prepare(s) => s.name(),
            PipelineStage::Remap(s) => s.name(),
            PipelineStage::Process(s) => s.name(),
        }
    }

    pub async fn run(&self, ctx: &StageContext, input: JarSet) -> PipelineResult<StageOutput> {
        match self {
            PipelineStage::Acquire(s) => s.run(ctx, input).await,
            PipelineStage::Prepare(s) => s.run(ctx, input).await,
            PipelineStage::Remap(s) => s.run(ctx, input).await,
            PipelineStage::Process(s) => s.run(ctx, input).await,
        }
    }
}

/// Builds the stage list for a context and runs it.
pub struct Pipeline {
    ctx: StageContext,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        Ok(Self {
            ctx: StageContext::new(config)?,
        })
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// The processing stage is only present when the chain has active specs.
    pub fn stages(&self, specs: ChainSpecs) -> Vec<PipelineStage> {
        let mut stages = vec![
            PipelineStage::Acquire(AcquireStage),
            PipelineStage::Prepare(PrepareStage),
            PipelineStage::Remap(RemapStage::new(OFFICIAL, INTERMEDIARY)),
            PipelineStage::Remap(RemapStage::new(INTERMEDIARY, NAMED)),
        ];
        if !specs.is_empty() {
            stages.push(PipelineStage::Process(ProcessStage::new(specs)));
        }
        stages
    }

    pub async fn run(&self) -> PipelineResult<ProvisionResult> {
        let started_at = Utc::now();
        let config = &self.ctx.config;
        info!(
            "Provisioning {} jars for version {}",
            config.jar_configuration, config.version
        );

        let specs = self.ctx.chain.build_specs(&self.ctx.processor_context())?;
        let mut set = JarSet::default();
        let mut report = Vec::new();

        for stage in self.stages(specs) {
            let name = stage.name();
            let begin = Utc::now();
            let output = stage.run(&self.ctx, set).await?;
            let elapsed_ms = (Utc::now() - begin).num_milliseconds();
            debug!("Stage {} finished: {:?} in {}ms", name, output.outcome, elapsed_ms);
            report.push(StageReport {
                stage: name,
                outcome: output.outcome,
                elapsed_ms,
            });
            set = output.jars;
        }

        let jars = set
            .jars
            .iter()
            .zip(&set.coordinates)
            .map(|(jar, coordinate)| PublishedJar {
                jar: jar.for_path(coordinate.path()),
                notation: coordinate.notation(),
            })
            .collect();

        Ok(ProvisionResult {
            version: config.version.clone(),
            jars,
            report,
            started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::ManifestSource;

    fn config(dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::new(
            "1.0",
            vec![ManifestSource {
                name: "main".into(),
                url: "http://127.0.0.1:9/versions.json".into(),
                priority: 0,
            }],
        );
        config.user_cache = dir.join("cache");
        config.project_root = dir.join("project");
        config
    }

    #[test]
    fn processing_stage_only_with_active_rules() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path())).unwrap();
        let ctx = pipeline.context();
        let specs = ctx.chain.build_specs(&ctx.processor_context()).unwrap();
        let names: Vec<String> = pipeline.stages(specs).iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "acquire",
                "prepare",
                "remap official -> intermediary",
                "remap intermediary -> named"
            ]
        );

        let widener = dir.path().join("project.accesswidener");
        std::fs::write(&widener, "accessWidener v1 named\naccessible class game/World\n").unwrap();
        let mut with_rules = config(dir.path());
        with_rules.access_widener = Some(widener);
        let pipeline = Pipeline::new(with_rules).unwrap();
        let ctx = pipeline.context();
        let specs = ctx.chain.build_specs(&ctx.processor_context()).unwrap();
        let hash = specs.hash().to_string();
        let stages = pipeline.stages(specs);
        assert_eq!(stages.len(), 5);
        assert_eq!(stages[4].name(), format!("process {}", hash));
    }

    #[test]
    fn missing_mappings_file_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.mappings = Some(dir.path().join("missing.tiny"));
        assert!(matches!(
            Pipeline::new(config),
            Err(crate::core::error::PipelineError::Io { .. })
        ));
    }

    #[test]
    fn result_lists_dependency_notations() {
        let result = ProvisionResult {
            version: "1.0".into(),
            jars: vec![PublishedJar {
                jar: GameJar::Merged("/repo/game-1.0-merged-named.jar".into()),
                notation: "net.jarsmith.game:game:1.0:merged-named".into(),
            }],
            report: vec![StageReport {
                stage: "acquire".into(),
                outcome: StageOutcome::Reused,
                elapsed_ms: 0,
            }],
            started_at: Utc::now(),
        };
        assert_eq!(result.dependencies(), vec!["net.jarsmith.game:game:1.0:merged-named"]);
        assert!(result.fully_cached());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["jars"][0]["jar"]["kind"], "merged");
    }
}
