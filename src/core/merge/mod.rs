// ─── Merge / Split Engine ───
// Combines a client and a server jar into one merged jar, or splits the
// pair into a common jar and a client-only delta.

mod class_merger;
mod split;

pub use class_merger::{apply_synthetic_params_offset, merge_classes};
pub use split::{JarSplitter, SplitStats, DEFAULT_SHARED_ENTRIES};

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info};

use crate::core::archive::{self, Entries};
use crate::core::error::{PipelineError, PipelineResult};

/// Counts reported after a merge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub client_only: usize,
    pub server_only: usize,
    pub identical: usize,
    pub merged_classes: usize,
    pub conflicting_resources: usize,
}

/// Merges a client and server jar entry by entry.
#[derive(Debug, Clone, Default)]
pub struct JarMerger {
    synthetic_params_offset: bool,
}

impl JarMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_synthetic_params_offset(mut self, enabled: bool) -> Self {
        self.synthetic_params_offset = enabled;
        self
    }

    /// Merge `client` and `server` into `dest`.
    ///
    /// Output order and timestamps are fixed, so the same inputs always
    /// produce the same bytes. Nothing is written to `dest` on failure.
    pub fn merge(&self, client: &Path, server: &Path, dest: &Path) -> PipelineResult<MergeStats> {
        info!(":merging jars {:?} + {:?}", client, server);
        let client_entries = archive::read_entries(client)?;
        let server_entries = archive::read_entries(server)?;

        let (merged, stats) = self.merge_entries(client_entries, server_entries)?;
        archive::write_entries(dest, &merged)?;

        info!(
            "Merged into {:?}: {} classes merged, {} client-only, {} server-only, {} identical",
            dest, stats.merged_classes, stats.client_only, stats.server_only, stats.identical
        );
        Ok(stats)
    }

    fn merge_entries(
        &self,
        mut client: Entries,
        mut server: Entries,
    ) -> PipelineResult<(Entries, MergeStats)> {
        let names: BTreeSet<String> = client.keys().chain(server.keys()).cloned().collect();
        let mut stats = MergeStats::default();
        let mut merged = Entries::new();

        for name in names {
            let bytes = match (client.remove(&name), server.remove(&name)) {
                (Some(c), None) => {
                    stats.client_only += 1;
                    c
                }
                (None, Some(s)) => {
                    stats.server_only += 1;
                    s
                }
                (Some(c), Some(s)) if c == s => {
                    stats.identical += 1;
                    c
                }
                (Some(c), Some(s)) if is_class(&name) => {
                    stats.merged_classes += 1;
                    merge_classes(&c, &s).map_err(|e| {
                        PipelineError::transform("merge", format!("{}: {}", name, e))
                    })?
                }
                (Some(c), Some(_)) => {
                    debug!("Resource {} differs between sides, keeping the client copy", name);
                    stats.conflicting_resources += 1;
                    c
                }
                (None, None) => continue,
            };

            let bytes = if self.synthetic_params_offset && is_class(&name) {
                apply_synthetic_params_offset(&bytes)
                    .map_err(|e| PipelineError::transform("merge", format!("{}: {}", name, e)))?
                    .unwrap_or(bytes)
            } else {
                bytes
            };
            merged.insert(name, bytes);
        }

        Ok((merged, stats))
    }
}

pub(crate) fn is_class(name: &str) -> bool {
    name.ends_with(".class")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::test_support::jar;
    use crate::core::classfile::{ClassFile, ACC_PUBLIC};

    fn class_bytes(methods: &[&str]) -> Vec<u8> {
        let mut c = ClassFile::new_class("game/Chunk", Some("java/lang/Object")).unwrap();
        for m in methods {
            c.add_method(ACC_PUBLIC, m, "()V", Some(&[0xb1])).unwrap();
        }
        c.to_bytes().unwrap()
    }

    fn fixture(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let client = dir.join("client.jar");
        let server = dir.join("server.jar");
        jar(
            &client,
            &[
                ("game/Chunk.class", &class_bytes(&["tick", "render"])),
                ("assets/logo.png", b"png"),
                ("version.txt", b"1.0-client"),
                ("shared.txt", b"same"),
            ],
        );
        jar(
            &server,
            &[
                ("game/Chunk.class", &class_bytes(&["tick", "save"])),
                ("game/Server.class", &class_bytes(&[])),
                ("version.txt", b"1.0-server"),
                ("shared.txt", b"same"),
            ],
        );
        (client, server)
    }

    #[test]
    fn merges_entries_by_origin() {
        let dir = tempfile::tempdir().unwrap();
        let (client, server) = fixture(dir.path());
        let dest = dir.path().join("merged.jar");

        let stats = JarMerger::new().merge(&client, &server, &dest).unwrap();
        assert_eq!(
            stats,
            MergeStats {
                client_only: 1,
                server_only: 1,
                identical: 1,
                merged_classes: 1,
                conflicting_resources: 1,
            }
        );

        let entries = archive::read_entries(&dest).unwrap();
        assert_eq!(entries["version.txt"], b"1.0-client");
        assert!(entries.contains_key("game/Server.class"));
        let chunk = ClassFile::parse(&entries["game/Chunk.class"]).unwrap();
        assert_eq!(chunk.methods.len(), 3);
    }

    #[test]
    fn merging_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (client, server) = fixture(dir.path());
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        let merger = JarMerger::new().with_synthetic_params_offset(true);
        merger.merge(&client, &server, &a).unwrap();
        merger.merge(&client, &server, &b).unwrap();
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[test]
    fn corrupt_class_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let client = dir.path().join("client.jar");
        let server = dir.path().join("server.jar");
        jar(&client, &[("a/B.class", b"not a class")]);
        jar(&server, &[("a/B.class", b"also not a class")]);
        let dest = dir.path().join("merged.jar");

        let err = JarMerger::new().merge(&client, &server, &dest).unwrap_err();
        assert!(matches!(err, PipelineError::Transform { .. }), "{}", err);
        assert!(!dest.exists());
    }
}
