use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::core::archive;
use crate::core::downloader::digest::sha256_hex;
use crate::core::error::{PipelineError, PipelineResult};

const VERSIONS_LIST: &str = "META-INF/versions.list";
const LIBRARIES_LIST: &str = "META-INF/libraries.list";
const MAIN_CLASS: &str = "META-INF/main-class";

/// One `<sha256>\t<id>\t<path>` line of a bundle list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub sha256: String,
    pub id: String,
    pub path: String,
}

/// Describes a server jar that is a container around the real server jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    pub versions: Vec<BundleEntry>,
    pub libraries: Vec<BundleEntry>,
    pub main_class: Option<String>,
}

impl BundleMetadata {
    /// Cheap read-only scan. `None` when the jar is a plain server jar.
    pub fn from_jar(jar: &Path) -> PipelineResult<Option<Self>> {
        let Some(versions) = archive::read_entry(jar, VERSIONS_LIST)? else {
            return Ok(None);
        };

        let libraries = archive::read_entry(jar, LIBRARIES_LIST)?;
        let main_class = archive::read_entry(jar, MAIN_CLASS)?
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Some(Self {
            versions: parse_list(&versions, jar)?,
            libraries: match libraries {
                Some(bytes) => parse_list(&bytes, jar)?,
                None => Vec::new(),
            },
            main_class,
        }))
    }

    /// Extract the single bundled version jar to `dest`, verifying its digest.
    pub fn extract_server(&self, bundle: &Path, dest: &Path) -> PipelineResult<()> {
        let entry = match self.versions.as_slice() {
            [entry] => entry,
            other => {
                return Err(PipelineError::UnsupportedConfiguration(format!(
                    "expected exactly one bundled server version, found {}",
                    other.len()
                )))
            }
        };

        let name = format!("META-INF/versions/{}", entry.path);
        let bytes = archive::read_entry(bundle, &name)?.ok_or_else(|| {
            PipelineError::transform("bundle extraction", format!("{} missing from bundle", name))
        })?;

        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(&entry.sha256) {
            return Err(PipelineError::Integrity {
                path: dest.to_path_buf(),
                expected: entry.sha256.clone(),
                actual,
            });
        }

        archive::write_atomically(dest, |tmp| {
            let mut file = std::fs::File::create(tmp).map_err(|e| PipelineError::io(tmp, e))?;
            file.write_all(&bytes).map_err(|e| PipelineError::io(tmp, e))?;
            Ok(())
        })?;

        info!("Extracted bundled server {} -> {:?}", entry.id, dest);
        Ok(())
    }
}

fn parse_list(bytes: &[u8], jar: &Path) -> PipelineResult<Vec<BundleEntry>> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            match parts.as_slice() {
                [sha256, id, path] => Ok(BundleEntry {
                    sha256: sha256.to_string(),
                    id: id.to_string(),
                    path: path.to_string(),
                }),
                _ => Err(PipelineError::transform(
                    "bundle scan",
                    format!("malformed bundle list line in {:?}: {:?}", jar, line),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::test_support::jar;

    #[test]
    fn plain_jar_has_no_bundle_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let server = dir.path().join("server.jar");
        jar(&server, &[("a/Server.class", b"x")]);
        assert_eq!(BundleMetadata::from_jar(&server).unwrap(), None);
    }

    #[test]
    fn extracts_nested_server_jar() {
        let dir = tempfile::tempdir().unwrap();
        let inner = b"inner-jar-bytes";
        let list = format!("{}\tgame-1.0\tserver-1.0.jar\n", sha256_hex(inner));
        let bundle = dir.path().join("bundle.jar");
        jar(
            &bundle,
            &[
                (VERSIONS_LIST, list.as_bytes()),
                (MAIN_CLASS, b"net.game.Main\n"),
                ("META-INF/versions/server-1.0.jar", inner),
            ],
        );

        let meta = BundleMetadata::from_jar(&bundle).unwrap().unwrap();
        assert_eq!(meta.versions[0].id, "game-1.0");
        assert_eq!(meta.main_class.as_deref(), Some("net.game.Main"));

        let dest = dir.path().join("server-extracted.jar");
        meta.extract_server(&bundle, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), inner);
    }

    #[test]
    fn extraction_rejects_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let list = format!("{}\tgame-1.0\tserver.jar\n", sha256_hex(b"other"));
        let bundle = dir.path().join("bundle.jar");
        jar(
            &bundle,
            &[(VERSIONS_LIST, list.as_bytes()), ("META-INF/versions/server.jar", b"x")],
        );
        let meta = BundleMetadata::from_jar(&bundle).unwrap().unwrap();
        let dest = dir.path().join("out.jar");
        assert!(matches!(
            meta.extract_server(&bundle, &dest),
            Err(PipelineError::Integrity { .. })
        ));
        assert!(!dest.exists());
    }
}
