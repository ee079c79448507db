// ─── Tiny v2 mappings ───
// `tiny\t2\t0\t<ns>...` header, then tab-indented `c`, `f` and `m` lines.
// Parameters, local variables and comments are read past.

use std::collections::HashMap;
use std::path::Path;

use crate::core::classfile::descriptor::map_descriptor;
use crate::core::error::{PipelineError, PipelineResult};

pub const OFFICIAL: &str = "official";
pub const INTERMEDIARY: &str = "intermediary";
pub const NAMED: &str = "named";

#[derive(Debug, Clone)]
struct MemberMapping {
    /// Descriptor in the first namespace.
    desc: String,
    names: Vec<String>,
}

#[derive(Debug, Clone)]
struct ClassMapping {
    names: Vec<String>,
    fields: Vec<MemberMapping>,
    methods: Vec<MemberMapping>,
}

#[derive(Debug, Clone)]
pub struct Mappings {
    namespaces: Vec<String>,
    classes: Vec<ClassMapping>,
}

/// Lookup tables from one namespace to another.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    pub(super) classes: HashMap<String, String>,
    pub(super) fields: HashMap<(String, String, String), String>,
    pub(super) methods: HashMap<(String, String, String), String>,
}

impl MappingTable {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.fields.is_empty() && self.methods.is_empty()
    }

    pub fn class(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(String::as_str)
    }
}

fn bad_line(line_no: usize, reason: &str) -> PipelineError {
    PipelineError::Mappings(format!("line {}: {}", line_no + 1, reason))
}

impl Mappings {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> PipelineResult<Self> {
        let mut lines = text.lines().enumerate();
        let (_, header) = lines
            .next()
            .ok_or_else(|| PipelineError::Mappings("empty mappings file".into()))?;
        let header: Vec<&str> = header.split('\t').collect();
        if header.len() < 5 || header[0] != "tiny" || header[1] != "2" {
            return Err(PipelineError::Mappings(
                "expected a 'tiny 2 <minor> <namespaces...>' header".into(),
            ));
        }
        let namespaces: Vec<String> = header[3..].iter().map(|s| s.to_string()).collect();
        let width = namespaces.len();

        let mut classes: Vec<ClassMapping> = Vec::new();
        for (line_no, line) in lines {
            let depth = line.chars().take_while(|&c| c == '\t').count();
            let cols: Vec<&str> = line[depth..].split('\t').collect();
            match (depth, cols.first().copied()) {
                // Header properties.
                (1, _) if classes.is_empty() => {}
                (0, Some("c")) => {
                    let names = names(&cols[1..], width).ok_or_else(|| bad_line(line_no, "class line too short"))?;
                    classes.push(ClassMapping {
                        names,
                        fields: Vec::new(),
                        methods: Vec::new(),
                    });
                }
                (1, Some(kind @ ("f" | "m"))) => {
                    let class = classes
                        .last_mut()
                        .ok_or_else(|| bad_line(line_no, "member outside a class"))?;
                    let desc = cols
                        .get(1)
                        .ok_or_else(|| bad_line(line_no, "member without descriptor"))?
                        .to_string();
                    let names = names(&cols[2..], width).ok_or_else(|| bad_line(line_no, "member line too short"))?;
                    let member = MemberMapping { desc, names };
                    if kind == "f" {
                        class.fields.push(member);
                    } else {
                        class.methods.push(member);
                    }
                }
                // Comments, parameters and local variables.
                (1.., _) => {}
                (0, _) if line.trim().is_empty() => {}
                (0, other) => {
                    return Err(bad_line(
                        line_no,
                        &format!("unexpected top-level entry {:?}", other.unwrap_or("")),
                    ))
                }
            }
        }

        Ok(Self { namespaces, classes })
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    fn namespace_index(&self, namespace: &str) -> PipelineResult<usize> {
        self.namespaces
            .iter()
            .position(|n| n == namespace)
            .ok_or_else(|| {
                PipelineError::UnsupportedConfiguration(format!(
                    "mappings have no '{}' namespace (available: {})",
                    namespace,
                    self.namespaces.join(", ")
                ))
            })
    }

    /// Build lookup tables keyed by names in `from`.
    pub fn table(&self, from: &str, to: &str) -> PipelineResult<MappingTable> {
        let from = self.namespace_index(from)?;
        let to = self.namespace_index(to)?;

        // First-namespace class name -> `from` name, to translate descriptors.
        let to_from: HashMap<&str, &str> = self
            .classes
            .iter()
            .map(|c| (c.names[0].as_str(), c.names[from].as_str()))
            .collect();
        let desc_in_from = |desc: &str| {
            if from == 0 {
                desc.to_string()
            } else {
                map_descriptor(desc, |n| to_from.get(n).map(|s| s.to_string()))
            }
        };

        let mut table = MappingTable::default();
        for class in &self.classes {
            let owner = &class.names[from];
            if class.names[to] != *owner {
                table.classes.insert(owner.clone(), class.names[to].clone());
            }
            for field in &class.fields {
                if field.names[to] != field.names[from] {
                    table.fields.insert(
                        (owner.clone(), field.names[from].clone(), desc_in_from(&field.desc)),
                        field.names[to].clone(),
                    );
                }
            }
            for method in &class.methods {
                if method.names[to] != method.names[from] {
                    table.methods.insert(
                        (owner.clone(), method.names[from].clone(), desc_in_from(&method.desc)),
                        method.names[to].clone(),
                    );
                }
            }
        }
        Ok(table)
    }
}

/// Names per namespace. Empty columns fall back to the first namespace.
fn names(cols: &[&str], width: usize) -> Option<Vec<String>> {
    let first = cols.first().filter(|s| !s.is_empty())?;
    Some(
        (0..width)
            .map(|i| match cols.get(i) {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => first.to_string(),
            })
            .collect(),
    )
}
