// ─── Mod descriptors ───
// Dependencies contribute access rules through `fabric.mod.json`, read from
// a mod jar or an exploded mod directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::archive;
use crate::core::error::{PipelineError, PipelineResult};

pub const MOD_JSON: &str = "fabric.mod.json";

/// Which side of the game a rule file applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModEnvironment {
    #[serde(rename = "*")]
    Universal,
    #[serde(rename = "client")]
    Client,
    #[serde(rename = "server")]
    Server,
}

impl ModEnvironment {
    pub fn is_client(self) -> bool {
        matches!(self, ModEnvironment::Universal | ModEnvironment::Client)
    }

    pub fn is_server(self) -> bool {
        matches!(self, ModEnvironment::Universal | ModEnvironment::Server)
    }
}

/// Read access to the files a mod ships.
pub trait ModSource: Send + Sync + fmt::Debug {
    /// Where the mod lives, for log messages.
    fn location(&self) -> &Path;

    /// Contents of `path` inside the mod, or `None` when it has no such file.
    fn read(&self, path: &str) -> PipelineResult<Option<Vec<u8>>>;
}

#[derive(Debug, Clone)]
pub struct JarMod {
    path: PathBuf,
}

impl JarMod {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModSource for JarMod {
    fn location(&self) -> &Path {
        &self.path
    }

    fn read(&self, path: &str) -> PipelineResult<Option<Vec<u8>>> {
        archive::read_entry(&self.path, path)
    }
}

#[derive(Debug, Clone)]
pub struct DirMod {
    root: PathBuf,
}

impl DirMod {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ModSource for DirMod {
    fn location(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &str) -> PipelineResult<Option<Vec<u8>>> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(PipelineError::io(
                relative,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "mod file paths must stay inside the mod",
                ),
            ));
        }
        let full = self.root.join(relative);
        match std::fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::io(full, e)),
        }
    }
}

/// Open a mod jar or directory.
pub fn open_mod(path: &Path) -> Box<dyn ModSource> {
    if path.is_dir() {
        Box::new(DirMod::new(path))
    } else {
        Box::new(JarMod::new(path))
    }
}

/// The parts of `fabric.mod.json` the processors care about.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModDescriptor {
    pub id: String,
    #[serde(default, rename = "accessWidener")]
    pub access_widener: Option<String>,
    #[serde(default, rename = "classTweakers")]
    pub class_tweakers: BTreeMap<String, ModEnvironment>,
}

impl ModDescriptor {
    /// `None` for plain libraries without a descriptor.
    pub fn read(source: &dyn ModSource) -> PipelineResult<Option<Self>> {
        match source.read(MOD_JSON)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rule files the mod declares, with the side each applies to.
    pub fn rule_files(&self) -> Vec<(String, ModEnvironment)> {
        let mut files: Vec<(String, ModEnvironment)> = self
            .access_widener
            .iter()
            .map(|p| (p.clone(), ModEnvironment::Universal))
            .collect();
        for (path, env) in &self.class_tweakers {
            if !files.iter().any(|(p, _)| p == path) {
                files.push((path.clone(), *env));
            }
        }
        files
    }
}
