// ─── Artifact Cache ───
// Published jars live in Maven layout under a GLOBAL (per user) or LOCAL
// (per project) root. Each slot pairs the jar with a `.backup` copy that is
// written last; a slot only counts once both exist.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ArtifactCoordinate, CacheScope, PomDocument};
use crate::core::archive;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::jar::JarKind;
use crate::core::processor::ProcessorChain;

/// Which pipeline stage an artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheStage {
    /// Output of a remap into `namespace`. Input-deterministic, so GLOBAL.
    Remapped { namespace: String },
    /// Output of the processor chain with the given aggregate hash. LOCAL.
    Processed { hash: String },
}

impl CacheStage {
    pub fn scope(&self) -> CacheScope {
        match self {
            CacheStage::Remapped { .. } => CacheScope::Global,
            CacheStage::Processed { .. } => CacheScope::Local,
        }
    }

    fn suffix(&self) -> &str {
        match self {
            CacheStage::Remapped { namespace } => namespace,
            CacheStage::Processed { hash } => hash,
        }
    }
}

/// On-disk state of one cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Missing,
    /// Jar and backup both present.
    Complete,
    /// Jar present without its backup: a run stopped before finishing.
    Interrupted,
    /// Backup present without its jar.
    Orphaned,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    group: String,
    artifact: String,
    version: String,
    global_root: PathBuf,
    local_root: PathBuf,
}

impl ArtifactCache {
    pub fn new(
        group: &str,
        artifact: &str,
        version: &str,
        global_root: impl Into<PathBuf>,
        local_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            global_root: global_root.into(),
            local_root: local_root.into(),
        }
    }

    pub fn root(&self, scope: CacheScope) -> &Path {
        match scope {
            CacheScope::Global => &self.global_root,
            CacheScope::Local => &self.local_root,
        }
    }

    /// Coordinate for `kind` at `stage`. The classifier is
    /// `<kind>-<namespace>` or `<kind>-<hash>`.
    pub fn coordinate_for(&self, stage: &CacheStage, kind: JarKind) -> ArtifactCoordinate {
        let scope = stage.scope();
        let classifier = format!("{}-{}", kind, stage.suffix());
        ArtifactCoordinate::new(
            &self.group,
            &self.artifact,
            &self.version,
            Some(&classifier),
            scope,
            self.root(scope),
        )
    }

    pub fn slot_state(&self, coordinate: &ArtifactCoordinate) -> SlotState {
        match (coordinate.path().exists(), coordinate.backup_path().exists()) {
            (true, true) => SlotState::Complete,
            (true, false) => SlotState::Interrupted,
            (false, true) => SlotState::Orphaned,
            (false, false) => SlotState::Missing,
        }
    }

    /// Whether the slot holds a finished artifact.
    pub fn exists(&self, coordinate: &ArtifactCoordinate) -> bool {
        self.slot_state(coordinate) == SlotState::Complete
    }

    /// Whether the slot must be produced again. With `input_hash` set, the
    /// jar must also record that processor hash in its manifest.
    pub fn is_stale(&self, coordinate: &ArtifactCoordinate, input_hash: Option<&str>) -> bool {
        if !self.exists(coordinate) {
            return true;
        }
        input_hash.is_some_and(|hash| ProcessorChain::requires_processing(&coordinate.path(), hash))
    }

    /// Copy `source` into the slot, write its POM, then the backup. Each file
    /// goes through a temp sibling so readers never see partial writes.
    pub fn publish(&self, source: &Path, coordinate: &ArtifactCoordinate) -> PipelineResult<PathBuf> {
        let path = coordinate.path();
        info!("Publishing {} to {:?}", coordinate.notation(), path);

        if source != path {
            archive::copy_atomically(source, &path)?;
        }

        let pom = coordinate.pom_path();
        if !pom.exists() {
            let xml = PomDocument::for_coordinate(coordinate).to_xml()?;
            archive::write_atomically(&pom, |tmp| {
                std::fs::write(tmp, xml.as_bytes()).map_err(|e| PipelineError::io(tmp, e))
            })?;
        }

        self.create_backup(source, coordinate)?;
        Ok(path)
    }

    /// Copy the published `source` to the slot's backup path. Marks the
    /// slot complete.
    fn create_backup(&self, source: &Path, coordinate: &ArtifactCoordinate) -> PipelineResult<PathBuf> {
        let backup = coordinate.backup_path();
        archive::copy_atomically(source, &backup)?;
        debug!("Backup written: {:?}", backup);
        Ok(backup)
    }

    /// The stable copy later stages read from.
    pub fn backup_jar(&self, coordinate: &ArtifactCoordinate) -> PipelineResult<PathBuf> {
        match self.slot_state(coordinate) {
            SlotState::Complete => Ok(coordinate.backup_path()),
            SlotState::Interrupted => Err(PipelineError::CacheCorruption {
                path: coordinate.path(),
                reason: "artifact has no backup copy".into(),
            }),
            SlotState::Orphaned => Err(PipelineError::CacheCorruption {
                path: coordinate.backup_path(),
                reason: "backup copy has no artifact".into(),
            }),
            SlotState::Missing => Err(PipelineError::io(
                coordinate.path(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "artifact not published"),
            )),
        }
    }

    /// Remove the jar and its backup.
    pub fn invalidate(&self, coordinate: &ArtifactCoordinate) -> PipelineResult<()> {
        for path in [coordinate.backup_path(), coordinate.path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Invalidated {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(PipelineError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Delete other slots of the same jar kind, e.g. jars processed with an
    /// older hash. Returns how many files were removed.
    pub fn delete_similar(&self, coordinate: &ArtifactCoordinate) -> PipelineResult<usize> {
        let Some((kind, _)) = coordinate.classifier.as_deref().and_then(|c| c.rsplit_once('-')) else {
            return Ok(0);
        };
        let dir = coordinate.root.join(coordinate.directory());
        let prefix = format!("{}-{}-{}-", coordinate.artifact_id, coordinate.version, kind);
        let keep = coordinate.filename();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PipelineError::io(dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && !name.starts_with(&keep) {
                std::fs::remove_file(entry.path()).map_err(|e| PipelineError::io(entry.path(), e))?;
                debug!("Removed stale artifact {}", name);
                removed += 1;
            }
        }
        Ok(removed)
    }
}
