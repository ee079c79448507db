use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which repository a published artifact lives in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Shared by every project using the same game version.
    Global,
    /// Owned by a single project root.
    Local,
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheScope::Global => write!(f, "global"),
            CacheScope::Local => write!(f, "local"),
        }
    }
}

/// A Maven coordinate pinned to the repository root it is stored under.
///
/// Supported formats:
///   `groupId:artifactId:version`
///   `groupId:artifactId:version:classifier`
///   `groupId:artifactId:version:classifier@packaging`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ArtifactCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension / packaging type. Defaults to `"jar"`.
    pub packaging: String,
    pub scope: CacheScope,
    pub root: PathBuf,
}

impl ArtifactCoordinate {
    pub fn new(
        group_id: &str,
        artifact_id: &str,
        version: &str,
        classifier: Option<&str>,
        scope: CacheScope,
        root: &Path,
    ) -> Self {
        Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
            classifier: classifier.map(str::to_string),
            packaging: "jar".to_string(),
            scope,
            root: root.to_path_buf(),
        }
    }

    /// Construct the group path portion (`net/example/game`).
    pub fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// `artifactId-version[-classifier].packaging`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact_id, self.version, c, self.packaging),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.packaging),
        }
    }

    /// `<group_path>/<artifact_id>/<version>`, relative to the root.
    pub fn directory(&self) -> PathBuf {
        PathBuf::from(self.group_path())
            .join(&self.artifact_id)
            .join(&self.version)
    }

    /// Path relative to the repository root.
    pub fn local_path(&self) -> PathBuf {
        self.directory().join(self.filename())
    }

    /// Absolute path of the artifact file.
    pub fn path(&self) -> PathBuf {
        self.root.join(self.local_path())
    }

    /// The stage-complete copy kept next to the artifact.
    pub fn backup_path(&self) -> PathBuf {
        self.root
            .join(self.directory())
            .join(format!("{}.backup", self.filename()))
    }

    /// POM shared by every classifier of this version.
    pub fn pom_path(&self) -> PathBuf {
        let mut pom = self.with_packaging("pom");
        pom.classifier = None;
        pom.path()
    }

    /// Return a new coordinate with packaging changed (e.g. to `"pom"`).
    pub fn with_packaging(&self, packaging: &str) -> Self {
        let mut clone = self.clone();
        clone.packaging = packaging.to_string();
        clone
    }

    /// `group:name:version[:classifier]`, as a build tool declares it.
    pub fn notation(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}:{}:{}:{}", self.group_id, self.artifact_id, self.version, c),
            None => format!("{}:{}:{}", self.group_id, self.artifact_id, self.version),
        }
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.notation(), self.packaging, self.scope)
    }
}
