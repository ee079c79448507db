mod rules;
mod transform;

pub use rules::{
    parse_access_widener, AccessChange, AccessRule, AccessRuleFile, ClassRules, ReaderRegistry,
    RuleReader, RuleSet, RuleTarget,
};
pub use transform::{apply_rules, transform_class};

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::mods::{ModDescriptor, ModEnvironment, ModSource};
use super::{JarProcessor, ProcessorContext};
use crate::core::downloader::digest::sha256_hex;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::jar::{GameJar, JarConfiguration};

/// Owner id given to the project's own rule file.
pub const LOCAL_ID: &str = "local";

/// One rule file taking part in processing. Only the identifying fields and
/// a digest of the contents are serialised into the spec hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccessWidenerEntry {
    pub owner: String,
    pub path: String,
    pub environment: ModEnvironment,
    pub transitive_only: bool,
    pub sha256: String,
    #[serde(skip)]
    contents: Vec<u8>,
}

impl AccessWidenerEntry {
    fn new(
        owner: &str,
        path: &str,
        environment: ModEnvironment,
        transitive_only: bool,
        contents: Vec<u8>,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            path: path.to_string(),
            environment,
            transitive_only,
            sha256: sha256_hex(&contents),
            contents,
        }
    }

    pub fn sort_key(&self) -> String {
        format!("{}:{}", self.owner, self.path)
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccessWidenerSpec {
    pub entries: Vec<AccessWidenerEntry>,
}

impl AccessWidenerSpec {
    /// Entries that apply to `jar`. A merged jar takes every entry and
    /// universal entries apply everywhere.
    pub fn entries_for<'s>(&'s self, jar: &GameJar) -> Vec<&'s AccessWidenerEntry> {
        self.entries
            .iter()
            .filter(|e| {
                jar.is_merged()
                    || (jar.includes_client() && e.environment.is_client())
                    || (jar.includes_server() && e.environment.is_server())
            })
            .collect()
    }
}

/// Widens class, method and field access from a local rule file and from
/// the rule files mod dependencies declare.
#[derive(Debug, Clone, Default)]
pub struct AccessWidenerProcessor {
    local: Option<PathBuf>,
}

impl AccessWidenerProcessor {
    pub fn new(local: Option<PathBuf>) -> Self {
        Self { local }
    }

    fn local_entry(&self, ctx: &ProcessorContext<'_>) -> PipelineResult<Option<AccessWidenerEntry>> {
        let Some(path) = &self.local else {
            return Ok(None);
        };
        let contents = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        // Only the file name is hashed, so moving the project keeps the slot.
        let name = path.file_name().unwrap_or(path.as_os_str()).to_string_lossy();
        // Fail now rather than at processing time.
        ctx.registry.read(&name, &contents)?;
        Ok(Some(AccessWidenerEntry::new(
            LOCAL_ID,
            &name,
            ModEnvironment::Universal,
            false,
            contents,
        )))
    }

    /// Rule files of one dependency. Entries that cannot be read are
    /// skipped; the error return covers an unreadable descriptor.
    fn mod_entries(
        &self,
        source: &dyn ModSource,
        ctx: &ProcessorContext<'_>,
    ) -> PipelineResult<Vec<AccessWidenerEntry>> {
        let Some(descriptor) = ModDescriptor::read(source)? else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for (path, environment) in descriptor.rule_files() {
            let contents = match source.read(&path) {
                Ok(Some(c)) => c,
                Ok(None) => {
                    warn!("Mod {} declares missing rule file {}", descriptor.id, path);
                    continue;
                }
                Err(e) => {
                    warn!("Could not read {} from mod {}: {}", path, descriptor.id, e);
                    continue;
                }
            };
            if let Err(e) = ctx.registry.read(&path, &contents) {
                warn!("Ignoring rule file {} from mod {}: {}", path, descriptor.id, e);
                continue;
            }
            entries.push(AccessWidenerEntry::new(
                &descriptor.id,
                &path,
                environment,
                true,
                contents,
            ));
        }
        Ok(entries)
    }
}

impl JarProcessor for AccessWidenerProcessor {
    type Spec = AccessWidenerSpec;

    fn name(&self) -> &'static str {
        "access widener"
    }

    fn build_spec(&self, ctx: &ProcessorContext<'_>) -> PipelineResult<Option<AccessWidenerSpec>> {
        let mut entries: Vec<AccessWidenerEntry> = self.local_entry(ctx)?.into_iter().collect();

        for source in ctx.mods {
            match self.mod_entries(source.as_ref(), ctx) {
                Ok(found) => entries.extend(found),
                Err(e) => warn!("Skipping access rules of {:?}: {}", source.location(), e),
            }
        }

        if entries.is_empty() {
            return Ok(None);
        }
        entries.sort_by_key(|e| e.sort_key());
        debug!("Access widener spec has {} rule files", entries.len());
        Ok(Some(AccessWidenerSpec { entries }))
    }

    fn process_jar(
        &self,
        jar: &GameJar,
        spec: &AccessWidenerSpec,
        ctx: &ProcessorContext<'_>,
    ) -> PipelineResult<()> {
        let mut rules = RuleSet::new();
        for entry in spec.entries_for(jar) {
            let file = ctx.registry.read(&entry.path, entry.contents())?;
            rules.add(&file, entry.transitive_only);
        }
        if rules.is_empty() {
            debug!("No access rules apply to the {} jar", jar.kind());
            return Ok(());
        }

        // Each half of a split only holds part of the game.
        let require_all = ctx.configuration != JarConfiguration::Split;
        let rewritten = apply_rules(jar.path(), &rules, require_all)?;
        info!(
            "Applied access rules for {} classes to {:?} ({} entries rewritten)",
            rules.len(),
            jar.path(),
            rewritten
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::mods::{open_mod, MOD_JSON};
    use super::*;
    use crate::core::archive::test_support::jar;

    const CLIENT_RULES: &str = "accessWidener v2 named\ntransitive-accessible class game/Renderer\n";
    const SERVER_RULES: &str = "accessWidener v2 named\ntransitive-accessible class game/Net\n";

    fn mod_jar(dir: &std::path::Path, name: &str, descriptor: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let mut entries: Vec<(&str, &[u8])> = vec![(MOD_JSON, descriptor.as_bytes())];
        entries.extend(files.iter().map(|(n, c)| (*n, c.as_bytes())));
        jar(&path, &entries);
        path
    }

    #[test]
    fn spec_is_sorted_and_filtered_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let b = mod_jar(
            dir.path(),
            "b.jar",
            r#"{"id":"b","classTweakers":{"server.aw":"server"}}"#,
            &[("server.aw", SERVER_RULES)],
        );
        let a = mod_jar(
            dir.path(),
            "a.jar",
            r#"{"id":"a","classTweakers":{"client.aw":"client"}}"#,
            &[("client.aw", CLIENT_RULES)],
        );
        let mods = vec![open_mod(&b), open_mod(&a)];
        let registry = ReaderRegistry::default();
        let ctx = ProcessorContext::new(JarConfiguration::Split, &mods, &registry);

        let spec = AccessWidenerProcessor::default().build_spec(&ctx).unwrap().unwrap();
        let keys: Vec<String> = spec.entries.iter().map(|e| e.sort_key()).collect();
        assert_eq!(keys, ["a:client.aw", "b:server.aw"]);
        assert!(spec.entries.iter().all(|e| e.transitive_only));

        let common = GameJar::Common("common.jar".into());
        let client_only = GameJar::ClientOnly("client-only.jar".into());
        let merged = GameJar::Merged("merged.jar".into());
        assert_eq!(spec.entries_for(&common)[0].owner, "b");
        assert_eq!(spec.entries_for(&client_only)[0].owner, "a");
        assert_eq!(spec.entries_for(&merged).len(), 2);
    }

    #[test]
    fn broken_mod_is_skipped_but_broken_local_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let broken = mod_jar(dir.path(), "broken.jar", "{ not json", &[]);
        let bad_rules = mod_jar(
            dir.path(),
            "bad-rules.jar",
            r#"{"id":"bad","accessWidener":"bad.aw"}"#,
            &[("bad.aw", "nonsense")],
        );
        let mods = vec![open_mod(&broken), open_mod(&bad_rules)];
        let registry = ReaderRegistry::default();
        let ctx = ProcessorContext::new(JarConfiguration::Merged, &mods, &registry);

        assert!(AccessWidenerProcessor::default().build_spec(&ctx).unwrap().is_none());

        let local = dir.path().join("project.accesswidener");
        std::fs::write(&local, "accessWidener v9 named\n").unwrap();
        assert!(AccessWidenerProcessor::new(Some(local)).build_spec(&ctx).is_err());

        let missing = dir.path().join("missing.accesswidener");
        assert!(AccessWidenerProcessor::new(Some(missing)).build_spec(&ctx).is_err());
    }

    #[test]
    fn universal_entries_apply_to_every_jar() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("project.accesswidener");
        std::fs::write(&local, CLIENT_RULES).unwrap();
        let mods: Vec<Box<dyn ModSource>> = Vec::new();
        let registry = ReaderRegistry::default();
        let ctx = ProcessorContext::new(JarConfiguration::Split, &mods, &registry);

        let spec = AccessWidenerProcessor::new(Some(local)).build_spec(&ctx).unwrap().unwrap();
        for jar in [
            GameJar::Server("server.jar".into()),
            GameJar::Client("client.jar".into()),
            GameJar::Common("common.jar".into()),
            GameJar::ClientOnly("client-only.jar".into()),
        ] {
            assert_eq!(spec.entries_for(&jar).len(), 1, "{:?}", jar);
        }
    }

    #[test]
    fn local_file_location_does_not_change_the_hash() {
        let dir = tempfile::tempdir().unwrap();
        let spec_at = |project: &str| {
            let root = dir.path().join(project);
            std::fs::create_dir_all(&root).unwrap();
            let local = root.join("project.accesswidener");
            std::fs::write(&local, CLIENT_RULES).unwrap();
            let mods: Vec<Box<dyn ModSource>> = Vec::new();
            let registry = ReaderRegistry::default();
            let ctx = ProcessorContext::new(JarConfiguration::Merged, &mods, &registry);
            AccessWidenerProcessor::new(Some(local)).build_spec(&ctx).unwrap().unwrap()
        };

        let before = spec_at("before");
        let after = spec_at("moved/elsewhere");
        assert_eq!(before.entries[0].path, "project.accesswidener");
        assert_eq!(before, after);
    }
}
