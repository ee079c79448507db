mod bundle;
pub mod manifest;

pub use bundle::{BundleEntry, BundleMetadata};
pub use manifest::Manifest;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{PipelineError, PipelineResult};

/// Which shape of jar a value holds. Strongly typed, no magic strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JarKind {
    Merged,
    Server,
    Client,
    Common,
    ClientOnly,
}

impl fmt::Display for JarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JarKind::Merged => write!(f, "merged"),
            JarKind::Server => write!(f, "server"),
            JarKind::Client => write!(f, "client"),
            JarKind::Common => write!(f, "common"),
            JarKind::ClientOnly => write!(f, "clientonly"),
        }
    }
}

/// A game jar on disk. Immutable: each stage produces new values via
/// [`GameJar::for_path`] instead of touching the ones it was given.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum GameJar {
    Merged(PathBuf),
    Server(PathBuf),
    Client(PathBuf),
    Common(PathBuf),
    ClientOnly(PathBuf),
}

impl GameJar {
    pub fn new(kind: JarKind, path: PathBuf) -> Self {
        match kind {
            JarKind::Merged => GameJar::Merged(path),
            JarKind::Server => GameJar::Server(path),
            JarKind::Client => GameJar::Client(path),
            JarKind::Common => GameJar::Common(path),
            JarKind::ClientOnly => GameJar::ClientOnly(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            GameJar::Merged(p)
            | GameJar::Server(p)
            | GameJar::Client(p)
            | GameJar::Common(p)
            | GameJar::ClientOnly(p) => p,
        }
    }

    pub fn kind(&self) -> JarKind {
        match self {
            GameJar::Merged(_) => JarKind::Merged,
            GameJar::Server(_) => JarKind::Server,
            GameJar::Client(_) => JarKind::Client,
            GameJar::Common(_) => JarKind::Common,
            GameJar::ClientOnly(_) => JarKind::ClientOnly,
        }
    }

    /// Same variant, different file.
    pub fn for_path(&self, path: PathBuf) -> Self {
        GameJar::new(self.kind(), path)
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, GameJar::Merged(_))
    }

    pub fn includes_client(&self) -> bool {
        matches!(self, GameJar::Merged(_) | GameJar::Client(_) | GameJar::ClientOnly(_))
    }

    /// The common half of a split carries the server side.
    pub fn includes_server(&self) -> bool {
        matches!(self, GameJar::Merged(_) | GameJar::Server(_) | GameJar::Common(_))
    }

    pub fn name(&self) -> String {
        self.kind().to_string()
    }
}

/// Which sides of the game a project compiles against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JarConfiguration {
    #[default]
    Merged,
    ServerOnly,
    ClientOnly,
    Split,
}

impl JarConfiguration {
    pub fn needs_client(self) -> bool {
        !matches!(self, JarConfiguration::ServerOnly)
    }

    pub fn needs_server(self) -> bool {
        !matches!(self, JarConfiguration::ClientOnly)
    }

    /// Check the manifest provides the sides this configuration needs.
    pub fn check_sides(self, has_client: bool, has_server: bool) -> PipelineResult<()> {
        match self {
            JarConfiguration::Merged | JarConfiguration::Split if !(has_client && has_server) => {
                Err(PipelineError::UnsupportedConfiguration(
                    "this version does not provide both the client and server jars - \
                     select the client-only or server-only jar configuration"
                        .into(),
                ))
            }
            JarConfiguration::ServerOnly if !has_server => Err(
                PipelineError::UnsupportedConfiguration("this version has no server jar".into()),
            ),
            JarConfiguration::ClientOnly if !has_client => Err(
                PipelineError::UnsupportedConfiguration("this version has no client jar".into()),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for JarConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JarConfiguration::Merged => write!(f, "merged"),
            JarConfiguration::ServerOnly => write!(f, "server_only"),
            JarConfiguration::ClientOnly => write!(f, "client_only"),
            JarConfiguration::Split => write!(f, "split"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_flags_follow_variant() {
        let merged = GameJar::Merged("m.jar".into());
        assert!(merged.is_merged() && merged.includes_client() && merged.includes_server());

        let common = GameJar::Common("c.jar".into());
        assert!(!common.includes_client() && common.includes_server());

        let client_only = GameJar::ClientOnly("co.jar".into());
        assert!(client_only.includes_client() && !client_only.includes_server());
    }

    #[test]
    fn for_path_keeps_variant() {
        let jar = GameJar::Server("a.jar".into());
        let moved = jar.for_path("b.jar".into());
        assert_eq!(moved, GameJar::Server("b.jar".into()));
        assert_eq!(jar.path(), Path::new("a.jar"));
    }

    #[test]
    fn merged_requires_both_sides() {
        let err = JarConfiguration::Merged.check_sides(false, true).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedConfiguration(_)));
        assert!(JarConfiguration::ServerOnly.check_sides(false, true).is_ok());
        assert!(JarConfiguration::ClientOnly.check_sides(false, true).is_err());
    }

    #[test]
    fn configuration_parses_from_snake_case() {
        let c: JarConfiguration = serde_json::from_str("\"server_only\"").unwrap();
        assert_eq!(c, JarConfiguration::ServerOnly);
    }
}
