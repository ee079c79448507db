// ─── Processor Chain ───
// Ordered bytecode processors. Each first describes what it would change
// (its spec), then applies that spec to a jar in place. The hash of the
// active specs decides whether a processed jar is still current.

pub mod access_widener;
pub mod mods;

pub use access_widener::{AccessWidenerProcessor, AccessWidenerSpec, ReaderRegistry};
pub use mods::{open_mod, ModDescriptor, ModEnvironment, ModSource};

use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::archive;
use crate::core::downloader::digest::sha256_hex;
use crate::core::error::PipelineResult;
use crate::core::jar::manifest::MANIFEST_PATH;
use crate::core::jar::{GameJar, JarConfiguration, Manifest};

/// Manifest attribute holding the chain hash a jar was processed with.
pub const PROCESSOR_HASH_ATTRIBUTE: &str = "Jarsmith-Processor-Hash";

const HASH_LENGTH: usize = 10;

/// Inputs processors read while building specs and processing.
pub struct ProcessorContext<'a> {
    pub configuration: JarConfiguration,
    pub mods: &'a [Box<dyn ModSource>],
    pub registry: &'a ReaderRegistry,
}

impl<'a> ProcessorContext<'a> {
    pub fn new(
        configuration: JarConfiguration,
        mods: &'a [Box<dyn ModSource>],
        registry: &'a ReaderRegistry,
    ) -> Self {
        Self {
            configuration,
            mods,
            registry,
        }
    }
}

pub trait JarProcessor {
    type Spec: Serialize;

    fn name(&self) -> &'static str;

    /// `None` when the processor has nothing to do; it is then left out of
    /// the chain hash.
    fn build_spec(&self, ctx: &ProcessorContext<'_>) -> PipelineResult<Option<Self::Spec>>;

    fn process_jar(
        &self,
        jar: &GameJar,
        spec: &Self::Spec,
        ctx: &ProcessorContext<'_>,
    ) -> PipelineResult<()>;
}

/// Dispatcher without Box<dyn>.
#[derive(Debug, Clone)]
pub enum Processor {
    AccessWidener(AccessWidenerProcessor),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "processor", rename_all = "snake_case")]
pub enum ProcessorSpec {
    AccessWidener(AccessWidenerSpec),
}

impl ProcessorSpec {
    pub fn hash(&self) -> PipelineResult<String> {
        Ok(sha256_hex(&serde_json::to_vec(self)?))
    }
}

impl Processor {
    pub fn name(&self) -> &'static str {
        match self {
            Processor::AccessWidener(p) => p.name(),
        }
    }

    pub fn build_spec(&self, ctx: &ProcessorContext<'_>) -> PipelineResult<Option<ProcessorSpec>> {
        match self {
            Processor::AccessWidener(p) => Ok(p.build_spec(ctx)?.map(ProcessorSpec::AccessWidener)),
        }
    }

    pub fn process_jar(
        &self,
        jar: &GameJar,
        spec: &ProcessorSpec,
        ctx: &ProcessorContext<'_>,
    ) -> PipelineResult<()> {
        match (self, spec) {
            (Processor::AccessWidener(p), ProcessorSpec::AccessWidener(s)) => p.process_jar(jar, s, ctx),
        }
    }
}

/// Specs of the processors that have work to do, in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpecs {
    specs: Vec<(usize, ProcessorSpec)>,
    hash: String,
}

impl ChainSpecs {
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Truncated SHA-256 over the ordered spec hashes.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorChain {
    processors: Vec<Processor>,
}

impl ProcessorChain {
    pub fn new(processors: Vec<Processor>) -> Self {
        Self { processors }
    }

    pub fn build_specs(&self, ctx: &ProcessorContext<'_>) -> PipelineResult<ChainSpecs> {
        let mut specs = Vec::new();
        let mut joined = String::new();
        for (i, processor) in self.processors.iter().enumerate() {
            if let Some(spec) = processor.build_spec(ctx)? {
                joined.push_str(&spec.hash()?);
                specs.push((i, spec));
            }
        }

        let hash = if specs.is_empty() {
            String::new()
        } else {
            sha256_hex(joined.as_bytes())[..HASH_LENGTH].to_string()
        };
        Ok(ChainSpecs { specs, hash })
    }

    /// Whether `jar` still needs processing for the chain `hash`: true when
    /// it is missing, unreadable, or was processed with another hash.
    pub fn requires_processing(jar: &Path, hash: &str) -> bool {
        if !jar.exists() {
            return true;
        }
        match archive::read_entry(jar, MANIFEST_PATH) {
            Ok(Some(bytes)) => Manifest::parse(&bytes).main_attribute(PROCESSOR_HASH_ATTRIBUTE) != Some(hash),
            Ok(None) => true,
            Err(e) => {
                warn!("Could not read {:?}: {}", jar, e);
                true
            }
        }
    }

    /// Run every active processor over `jar` in place, then record the chain
    /// hash. The jar is deleted when any processor fails.
    pub fn process_jar(
        &self,
        jar: &GameJar,
        specs: &ChainSpecs,
        ctx: &ProcessorContext<'_>,
    ) -> PipelineResult<()> {
        info!(":processing {} jar {:?} ({})", jar.kind(), jar.path(), specs.hash());
        let result = self.process_inner(jar, specs, ctx);
        if let Err(e) = &result {
            error!("Processing {:?} failed, deleting it: {}", jar.path(), e);
            let _ = std::fs::remove_file(jar.path());
        }
        result
    }

    fn process_inner(
        &self,
        jar: &GameJar,
        specs: &ChainSpecs,
        ctx: &ProcessorContext<'_>,
    ) -> PipelineResult<()> {
        for (index, spec) in &specs.specs {
            let processor = &self.processors[*index];
            processor
                .process_jar(jar, spec, ctx)
                .map_err(|e| e.into_transform("process"))?;
        }

        let mut manifest = match archive::read_entry(jar.path(), MANIFEST_PATH)? {
            Some(bytes) => Manifest::parse(&bytes),
            None => Manifest::default(),
        };
        manifest.set_main_attribute(PROCESSOR_HASH_ATTRIBUTE, specs.hash());
        archive::put_entry(jar.path(), MANIFEST_PATH, &manifest.to_bytes())
    }
}

impl Default for ProcessorChain {
    fn default() -> Self {
        Self::new(vec![Processor::AccessWidener(AccessWidenerProcessor::default())])
    }
}
