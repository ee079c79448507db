// ─── Pipeline Configuration ───
// One provisioning run is described by a JSON file. Everything except the
// version and the manifest sources has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::jar::JarConfiguration;
use crate::core::maven::{DEFAULT_ARTIFACT, DEFAULT_GROUP, LOCAL_REPOSITORY};
use crate::core::merge::DEFAULT_SHARED_ENTRIES;
use crate::core::version::ManifestSource;

const APP_DIR_NAME: &str = "jarsmith";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    #[serde(default)]
    pub jar_configuration: JarConfiguration,
    pub manifest_sources: Vec<ManifestSource>,
    /// GLOBAL cache root: downloads, working jars and the shared repository.
    #[serde(default = "default_user_cache")]
    pub user_cache: PathBuf,
    /// The LOCAL repository lives under this directory.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Tiny v2 mappings. Without them every remap is an identity pass.
    #[serde(default)]
    pub mappings: Option<PathBuf>,
    /// Project-level access widener.
    #[serde(default)]
    pub access_widener: Option<PathBuf>,
    /// Mod jars or directories whose descriptors contribute rules.
    #[serde(default)]
    pub mods: Vec<PathBuf>,
    /// Ignore every cached stage output.
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub offline: bool,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_artifact")]
    pub artifact: String,
    /// Entries copied into both halves of a split.
    #[serde(default = "default_shared_entries")]
    pub shared_entries: Vec<String>,
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    #[serde(default = "default_manifest_max_age_hours")]
    pub manifest_max_age_hours: u64,
}

fn default_user_cache() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_artifact() -> String {
    DEFAULT_ARTIFACT.to_string()
}

fn default_shared_entries() -> Vec<String> {
    DEFAULT_SHARED_ENTRIES.iter().map(|s| s.to_string()).collect()
}

fn default_download_concurrency() -> usize {
    2
}

fn default_manifest_max_age_hours() -> u64 {
    24
}

impl PipelineConfig {
    pub fn new(version: impl Into<String>, manifest_sources: Vec<ManifestSource>) -> Self {
        Self {
            version: version.into(),
            jar_configuration: JarConfiguration::default(),
            manifest_sources,
            user_cache: default_user_cache(),
            project_root: default_project_root(),
            mappings: None,
            access_widener: None,
            mods: Vec::new(),
            refresh: false,
            offline: false,
            group: default_group(),
            artifact: default_artifact(),
            shared_entries: default_shared_entries(),
            download_concurrency: default_download_concurrency(),
            manifest_max_age_hours: default_manifest_max_age_hours(),
        }
    }

    /// Read and validate a config file. Relative paths inside it are taken
    /// relative to the file's directory.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let mut config: Self = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.version.trim().is_empty() {
            return Err(PipelineError::UnsupportedConfiguration(
                "no game version configured".into(),
            ));
        }
        if self.manifest_sources.is_empty() {
            return Err(PipelineError::UnsupportedConfiguration(
                "at least one manifest source is required".into(),
            ));
        }
        if self.download_concurrency == 0 {
            return Err(PipelineError::UnsupportedConfiguration(
                "download_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.project_root);
        if let Some(p) = self.mappings.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.access_widener.as_mut() {
            resolve(p);
        }
        self.mods.iter_mut().for_each(resolve);
    }

    /// Raw downloads and intermediate merge/split jars.
    pub fn working_dir(&self) -> PathBuf {
        self.user_cache.join(&self.version)
    }

    pub fn global_repository(&self) -> PathBuf {
        self.user_cache.join("repo")
    }

    pub fn local_repository(&self) -> PathBuf {
        self.project_root.join(LOCAL_REPOSITORY)
    }

    pub fn manifest_max_age(&self) -> Duration {
        Duration::from_secs(self.manifest_max_age_hours * 60 * 60)
    }
}
