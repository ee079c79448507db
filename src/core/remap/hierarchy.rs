use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::core::archive::{self, Entries};
use crate::core::classfile::ClassFile;
use crate::core::error::PipelineResult;
use crate::core::merge::is_class;

#[derive(Debug, Clone, Default)]
struct Parents {
    super_name: Option<String>,
    interfaces: Vec<String>,
}

/// Superclass and interface edges of every class the remapper can see,
/// keyed by source-namespace name.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: HashMap<String, Parents>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Record every class in `entries`. `rename` translates names found in
    /// the jar back into the source namespace.
    pub fn add_entries<F>(&mut self, entries: &Entries, rename: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> String,
    {
        for (name, bytes) in entries {
            if !is_class(name) || name.starts_with("META-INF/") {
                continue;
            }
            let class = ClassFile::parse(bytes)?;
            let parents = Parents {
                super_name: class.super_name()?.map(|s| rename(&s)),
                interfaces: class
                    .interface_names()?
                    .iter()
                    .map(|i| rename(i))
                    .collect(),
            };
            self.classes.insert(rename(&class.name()?), parents);
        }
        Ok(())
    }

    pub fn add_jar<F>(&mut self, path: &Path, rename: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> String,
    {
        let entries = archive::read_entries(path)?;
        self.add_entries(&entries, rename)
    }

    /// `class` followed by its ancestors, nearest first. Classes outside the
    /// hierarchy end the walk on that branch.
    pub fn ancestors(&self, class: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([class.to_string()]);

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(parents) = self.classes.get(&next) {
                queue.extend(parents.super_name.iter().cloned());
                queue.extend(parents.interfaces.iter().cloned());
            }
            order.push(next);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, super_name: &str, interfaces: &[&str]) -> (String, Vec<u8>) {
        let mut c = ClassFile::new_class(name, Some(super_name)).unwrap();
        for i in interfaces {
            c.add_interface(i).unwrap();
        }
        (format!("{}.class", name), c.to_bytes().unwrap())
    }

    #[test]
    fn walks_superclasses_then_interfaces() {
        let entries: Entries = [
            class("c", "b", &["i"]),
            class("b", "a", &[]),
            class("a", "java/lang/Object", &[]),
            class("i", "java/lang/Object", &[]),
        ]
        .into_iter()
        .collect();

        let mut h = ClassHierarchy::new();
        h.add_entries(&entries, |n| n.to_string()).unwrap();
        assert_eq!(h.len(), 4);
        assert_eq!(h.ancestors("c"), ["c", "b", "i", "a", "java/lang/Object"]);
        assert_eq!(h.ancestors("unknown"), ["unknown"]);
    }

    #[test]
    fn rename_maps_names_back_to_source_namespace() {
        let entries: Entries = [class("game/World", "game/Base", &[])].into_iter().collect();
        let mut h = ClassHierarchy::new();
        h.add_entries(&entries, |n| match n {
            "game/World" => "a".into(),
            "game/Base" => "b".into(),
            other => other.into(),
        })
        .unwrap();
        assert_eq!(h.ancestors("a"), ["a", "b"]);
    }
}
