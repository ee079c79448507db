// ─── Remap Engine ───
// Renames classes and members from one mapping namespace to another and
// fixes META-INF so the rewritten jar is not rejected as tampered.

mod hierarchy;
pub mod mappings;

pub use hierarchy::ClassHierarchy;
pub use mappings::{MappingTable, Mappings, INTERMEDIARY, NAMED, OFFICIAL};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::archive::{self, Entries};
use crate::core::classfile::{ClassFile, NameMapper, Rebuilder};
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::jar::manifest::MANIFEST_PATH;
use crate::core::jar::{GameJar, JarKind, Manifest};
use crate::core::merge::is_class;

/// One jar to remap: where it comes from, what it becomes and which
/// namespaces it moves between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemappedArtifact {
    pub input: PathBuf,
    pub output: GameJar,
    pub from: String,
    pub to: String,
    /// Jars already remapped into `to` whose classes this one extends.
    pub classpath: Vec<PathBuf>,
}

impl RemappedArtifact {
    pub fn new(input: PathBuf, output: GameJar, from: &str, to: &str) -> Self {
        Self {
            input,
            output,
            from: from.to_string(),
            to: to.to_string(),
            classpath: Vec::new(),
        }
    }

    pub fn with_classpath(mut self, classpath: Vec<PathBuf>) -> Self {
        self.classpath = classpath;
        self
    }
}

/// Resolves names through a [`MappingTable`], walking the class hierarchy
/// for members declared on a supertype.
pub struct Remapper<'a> {
    table: &'a MappingTable,
    hierarchy: &'a ClassHierarchy,
}

impl<'a> Remapper<'a> {
    pub fn new(table: &'a MappingTable, hierarchy: &'a ClassHierarchy) -> Self {
        Self { table, hierarchy }
    }

    fn lookup(
        &self,
        members: &HashMap<(String, String, String), String>,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> Option<String> {
        self.hierarchy.ancestors(owner).into_iter().find_map(|class| {
            members
                .get(&(class, name.to_string(), desc.to_string()))
                .cloned()
        })
    }
}

impl NameMapper for Remapper<'_> {
    fn map_class(&self, name: &str) -> Option<String> {
        if let Some(mapped) = self.table.classes.get(name) {
            return Some(mapped.clone());
        }
        // Nested classes the mappings omit follow their outer class.
        let (outer, inner) = name.rsplit_once('$')?;
        self.map_class(outer).map(|o| format!("{}${}", o, inner))
    }

    fn map_field(&self, owner: &str, name: &str, desc: &str) -> Option<String> {
        self.lookup(&self.table.fields, owner, name, desc)
    }

    fn map_method(&self, owner: &str, name: &str, desc: &str) -> Option<String> {
        if name.starts_with('<') {
            return None;
        }
        self.lookup(&self.table.methods, owner, name, desc)
    }
}

/// Remaps game jars. Without mappings every remap is an identity pass that
/// still fixes META-INF.
#[derive(Debug, Clone, Default)]
pub struct RemapEngine {
    mappings: Option<Arc<Mappings>>,
}

impl RemapEngine {
    pub fn new(mappings: Option<Arc<Mappings>>) -> Self {
        Self { mappings }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn has_mappings(&self) -> bool {
        self.mappings.is_some()
    }

    fn table(&self, from: &str, to: &str) -> PipelineResult<MappingTable> {
        match &self.mappings {
            Some(m) if from != to => m.table(from, to),
            _ => Ok(MappingTable::default()),
        }
    }

    /// Remap every artifact. Common jars go first so a client-only jar can
    /// name their outputs as classpath. Any failure deletes every output of
    /// the call before the error is returned.
    pub fn remap(&self, inputs: &[RemappedArtifact]) -> PipelineResult<Vec<GameJar>> {
        let mut order: Vec<&RemappedArtifact> = inputs.iter().collect();
        order.sort_by_key(|a| a.output.kind() == JarKind::ClientOnly);

        if let Err(e) = self.remap_in_order(&order) {
            error!("Remap failed, removing outputs: {}", e);
            for artifact in inputs {
                let _ = std::fs::remove_file(artifact.output.path());
            }
            return Err(e);
        }
        Ok(inputs.iter().map(|a| a.output.clone()).collect())
    }

    fn remap_in_order(&self, order: &[&RemappedArtifact]) -> PipelineResult<()> {
        for artifact in order {
            self.remap_one(artifact)?;
        }
        Ok(())
    }

    fn remap_one(&self, artifact: &RemappedArtifact) -> PipelineResult<()> {
        info!(
            ":remapping {} jar {:?} ({} -> {})",
            artifact.output.kind(),
            artifact.input,
            artifact.from,
            artifact.to
        );
        let table = self.table(&artifact.from, &artifact.to)?;
        let entries = archive::read_entries(&artifact.input)?;

        let remapped = if table.is_empty() {
            fix_meta_inf(entries, None)?
        } else {
            let mut hierarchy = ClassHierarchy::new();
            hierarchy
                .add_entries(&entries, |n| n.to_string())
                .map_err(|e| e.into_transform("remap"))?;

            // Classpath jars carry target names; read them back as source names.
            let inverse: HashMap<&str, &str> = table
                .classes
                .iter()
                .map(|(from, to)| (to.as_str(), from.as_str()))
                .collect();
            for jar in &artifact.classpath {
                debug!("Remap classpath: {:?}", jar);
                hierarchy
                    .add_jar(jar, |n| inverse.get(n).map_or_else(|| n.to_string(), |s| s.to_string()))
                    .map_err(|e| e.into_transform("remap"))?;
            }

            let remapper = Remapper::new(&table, &hierarchy);
            fix_meta_inf(entries, Some(&remapper))?
        };

        archive::write_entries(artifact.output.path(), &remapped)?;
        debug!("Remapped {} entries into {:?}", remapped.len(), artifact.output.path());
        Ok(())
    }
}

/// Rename classes through `remapper` (when given), drop signature files and
/// strip digests from the manifest. Other resources pass through.
fn fix_meta_inf(entries: Entries, remapper: Option<&Remapper<'_>>) -> PipelineResult<Entries> {
    let mut out = Entries::new();
    for (name, bytes) in entries {
        if is_signature_file(&name) {
            debug!("Dropping signature file {}", name);
            continue;
        }
        if name == MANIFEST_PATH {
            let mut manifest = Manifest::parse(&bytes);
            manifest.strip_digests();
            out.insert(name, manifest.to_bytes());
            continue;
        }
        match remapper {
            Some(remapper) if is_class(&name) => {
                let (path, bytes) = remap_class(&name, &bytes, remapper)
                    .map_err(|e| PipelineError::transform("remap", format!("{}: {}", name, e)))?;
                out.insert(path, bytes);
            }
            _ => {
                out.insert(name, bytes);
            }
        }
    }
    Ok(out)
}

fn remap_class(entry: &str, bytes: &[u8], remapper: &Remapper<'_>) -> PipelineResult<(String, Vec<u8>)> {
    let class = ClassFile::parse(bytes)?;
    let old = class.name()?;
    let rebuilt = Rebuilder::rebuild(&class, remapper)?;
    let new = rebuilt.name()?;

    // Keep any directory prefix such as META-INF/versions/<n>/.
    let path = match entry.strip_suffix(".class").and_then(|s| s.strip_suffix(old.as_str())) {
        Some(prefix) if prefix.is_empty() || prefix.ends_with('/') => format!("{}{}.class", prefix, new),
        _ => entry.to_string(),
    };
    Ok((path, rebuilt.to_bytes()?))
}

fn is_signature_file(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    upper.starts_with("SIG-") || [".SF", ".RSA", ".DSA", ".EC"].iter().any(|ext| upper.ends_with(ext))
}
