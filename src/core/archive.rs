// ─── Archive helpers ───
// Jar reading/writing shared by the merge, split, remap and process stages.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::core::error::{PipelineError, PipelineResult};

/// Entry name -> contents, ordered by name.
pub type Entries = BTreeMap<String, Vec<u8>>;

/// Replacement function for one named entry.
pub type EntryTransform<'a> = Box<dyn FnMut(Vec<u8>) -> PipelineResult<Vec<u8>> + 'a>;

/// Fixed options so identical inputs always produce identical archives.
pub fn deterministic_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

pub fn open(path: &Path) -> PipelineResult<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(ZipArchive::new(file)?)
}

/// Read every file entry (directories are skipped).
pub fn read_entries(path: &Path) -> PipelineResult<Entries> {
    let mut archive = open(path)?;
    let mut entries = Entries::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| PipelineError::io(path, e))?;
        entries.insert(file.name().to_string(), buf);
    }

    Ok(entries)
}

pub fn read_entry(path: &Path, name: &str) -> PipelineResult<Option<Vec<u8>>> {
    let mut archive = open(path)?;
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)
        .map_err(|e| PipelineError::io(path, e))?;
    Ok(Some(buf))
}

/// Write `entries` to `dest` in sorted order with fixed timestamps.
pub fn write_entries<'a, I>(dest: &Path, entries: I) -> PipelineResult<()>
where
    I: IntoIterator<Item = (&'a String, &'a Vec<u8>)>,
{
    write_atomically(dest, |tmp| {
        let file = File::create(tmp).map_err(|e| PipelineError::io(tmp, e))?;
        let mut writer = ZipWriter::new(file);
        let options = deterministic_options();

        let mut sorted: Vec<_> = entries.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        for (name, bytes) in sorted {
            writer.start_file(name.as_str(), options)?;
            writer
                .write_all(bytes)
                .map_err(|e| PipelineError::io(tmp, e))?;
        }
        writer.finish()?;
        Ok(())
    })
}

/// Unique sibling used for write-then-rename.
pub fn temp_sibling(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
}

/// Run `write` against a temp sibling and rename it onto `dest` on success.
/// Readers never observe a half-written `dest`.
pub fn write_atomically<F>(dest: &Path, write: F) -> PipelineResult<()>
where
    F: FnOnce(&Path) -> PipelineResult<()>,
{
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let tmp = temp_sibling(dest);
    if let Err(e) = write(&tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    std::fs::rename(&tmp, dest).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        PipelineError::io(dest, e)
    })
}

/// Copy a file into place through a temp sibling.
pub fn copy_atomically(source: &Path, dest: &Path) -> PipelineResult<()> {
    write_atomically(dest, |tmp| {
        std::fs::copy(source, tmp).map_err(|e| PipelineError::io(source, e))?;
        Ok(())
    })
}

/// Rewrite the archive in place, replacing each entry named in
/// `transforms`. Entries no transform names are copied through untouched.
///
/// Returns the names that were actually replaced.
pub fn transform(
    path: &Path,
    mut transforms: HashMap<String, EntryTransform<'_>>,
) -> PipelineResult<Vec<String>> {
    let mut archive = open(path)?;
    let mut replaced = Vec::new();

    write_atomically(path, |tmp| {
        let file = File::create(tmp).map_err(|e| PipelineError::io(tmp, e))?;
        let mut writer = ZipWriter::new(file);

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            let name = entry.name().to_string();

            match transforms.get_mut(&name) {
                Some(transform) => {
                    let mut entry = entry;
                    let mut input = Vec::with_capacity(entry.size() as usize);
                    entry
                        .read_to_end(&mut input)
                        .map_err(|e| PipelineError::io(path, e))?;
                    drop(entry);

                    let output = transform(input)?;
                    writer.start_file(name.as_str(), deterministic_options())?;
                    writer
                        .write_all(&output)
                        .map_err(|e| PipelineError::io(tmp, e))?;
                    replaced.push(name);
                }
                None => writer.raw_copy_file(entry)?,
            }
        }

        writer.finish()?;
        Ok(())
    })?;

    Ok(replaced)
}

/// Rewrite the archive in place with `name` holding `contents`, adding the
/// entry when it is missing.
pub fn put_entry(path: &Path, name: &str, contents: &[u8]) -> PipelineResult<()> {
    let mut archive = open(path)?;

    write_atomically(path, |tmp| {
        let file = File::create(tmp).map_err(|e| PipelineError::io(tmp, e))?;
        let mut writer = ZipWriter::new(file);

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.name() == name {
                continue;
            }
            writer.raw_copy_file(entry)?;
        }
        writer.start_file(name, deterministic_options())?;
        writer
            .write_all(contents)
            .map_err(|e| PipelineError::io(tmp, e))?;
        writer.finish()?;
        Ok(())
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn jar(path: &Path, entries: &[(&str, &[u8])]) {
        let map: Entries = entries
            .iter()
            .map(|(n, b)| (n.to_string(), b.to_vec()))
            .collect();
        write_entries(path, &map).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::jar;
    use super::*;

    #[test]
    fn write_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        jar(&a, &[("z.txt", b"z"), ("a/b.class", b"x")]);
        jar(&b, &[("a/b.class", b"x"), ("z.txt", b"z")]);
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn transform_replaces_only_named_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jar");
        jar(&path, &[("keep.txt", b"keep"), ("change.txt", b"old")]);

        let mut transforms: HashMap<String, EntryTransform> = HashMap::new();
        transforms.insert(
            "change.txt".into(),
            Box::new(|mut bytes| {
                bytes.extend_from_slice(b"-new");
                Ok(bytes)
            }),
        );
        let replaced = transform(&path, transforms).unwrap();
        assert_eq!(replaced, vec!["change.txt".to_string()]);

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries["keep.txt"], b"keep");
        assert_eq!(entries["change.txt"], b"old-new");
    }

    #[test]
    fn put_entry_adds_or_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jar");
        jar(&path, &[("a.txt", b"a")]);

        put_entry(&path, "b.txt", b"b").unwrap();
        put_entry(&path, "a.txt", b"a2").unwrap();
        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a.txt"], b"a2");
        assert_eq!(entries["b.txt"], b"b");
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.jar");
        let result = write_atomically(&dest, |tmp| {
            std::fs::write(tmp, b"partial").unwrap();
            Err(PipelineError::transform("merge", "boom"))
        });
        assert!(result.is_err());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
