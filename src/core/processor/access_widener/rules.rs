// ─── Access rule files ───
// `accessWidener v1|v2 <namespace>` header, then one rule per line:
//   accessible class  <class>
//   extendable method <owner> <name> <descriptor>
//   mutable    field  <owner> <name> <descriptor>
// v2 adds `transitive-` variants. `#` starts a comment.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessChange {
    Accessible,
    Extendable,
    Mutable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleTarget {
    Class(String),
    Method { owner: String, name: String, descriptor: String },
    Field { owner: String, name: String, descriptor: String },
}

impl RuleTarget {
    /// Class whose bytes the rule rewrites.
    pub fn class_name(&self) -> &str {
        match self {
            RuleTarget::Class(name) => name,
            RuleTarget::Method { owner, .. } | RuleTarget::Field { owner, .. } => owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub change: AccessChange,
    pub target: RuleTarget,
    pub transitive: bool,
}

/// One parsed rule file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRuleFile {
    pub version: u8,
    pub namespace: String,
    pub rules: Vec<AccessRule>,
}

fn rule_error(source: &str, line: usize, reason: impl Into<String>) -> PipelineError {
    PipelineError::AccessRule {
        source_name: source.to_string(),
        line,
        reason: reason.into(),
    }
}

pub fn parse_access_widener(source: &str, text: &str) -> PipelineResult<AccessRuleFile> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.split('#').next().unwrap_or("").trim()))
        .filter(|(_, l)| !l.is_empty());

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| rule_error(source, 1, "empty file"))?;
    let header: Vec<&str> = header.split_whitespace().collect();
    let version = match header.as_slice() {
        ["accessWidener", "v1", _] => 1,
        ["accessWidener", "v2", _] => 2,
        _ => {
            return Err(rule_error(
                source,
                header_line,
                "expected 'accessWidener <v1|v2> <namespace>'",
            ))
        }
    };
    let namespace = header[2].to_string();

    let mut rules = Vec::new();
    for (line, text) in lines {
        let cols: Vec<&str> = text.split_whitespace().collect();
        let (keyword, transitive) = match cols[0].strip_prefix("transitive-") {
            Some(_) if version < 2 => {
                return Err(rule_error(source, line, "transitive rules need accessWidener v2"))
            }
            Some(k) => (k, true),
            None => (cols[0], false),
        };
        let change = match keyword {
            "accessible" => AccessChange::Accessible,
            "extendable" => AccessChange::Extendable,
            "mutable" => AccessChange::Mutable,
            other => return Err(rule_error(source, line, format!("unknown access '{}'", other))),
        };

        let target = match (cols.get(1).copied(), cols.get(2..).unwrap_or(&[])) {
            (Some("class"), [name]) => RuleTarget::Class(name.to_string()),
            (Some("method"), [owner, name, descriptor]) => RuleTarget::Method {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
            (Some("field"), [owner, name, descriptor]) => RuleTarget::Field {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
            _ => return Err(rule_error(source, line, "malformed rule")),
        };

        match (change, &target) {
            (AccessChange::Mutable, RuleTarget::Class(_) | RuleTarget::Method { .. }) => {
                return Err(rule_error(source, line, "only fields can be made mutable"))
            }
            (AccessChange::Extendable, RuleTarget::Field { .. }) => {
                return Err(rule_error(source, line, "fields cannot be made extendable"))
            }
            _ => {}
        }

        rules.push(AccessRule {
            change,
            target,
            transitive,
        });
    }

    Ok(AccessRuleFile {
        version,
        namespace,
        rules,
    })
}

/// Parses one rule file format.
pub type RuleReader = fn(&str, &str) -> PipelineResult<AccessRuleFile>;

/// File extension -> reader. Passed to the processor chain rather than
/// kept as process-wide state.
#[derive(Clone)]
pub struct ReaderRegistry {
    readers: HashMap<String, RuleReader>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("accesswidener", parse_access_widener);
        registry.register("aw", parse_access_widener);
        registry
    }
}

impl ReaderRegistry {
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    pub fn register(&mut self, extension: &str, reader: RuleReader) {
        self.readers.insert(extension.to_ascii_lowercase(), reader);
    }

    fn reader_for(&self, path: &str) -> Option<RuleReader> {
        let ext = path.rsplit('.').next()?.to_ascii_lowercase();
        self.readers.get(&ext).copied()
    }

    pub fn read(&self, path: &str, contents: &[u8]) -> PipelineResult<AccessRuleFile> {
        let reader = self.reader_for(path).ok_or_else(|| {
            rule_error(path, 0, "unsupported access rule file extension")
        })?;
        let text = std::str::from_utf8(contents)
            .map_err(|e| rule_error(path, 0, format!("not UTF-8: {}", e)))?;
        reader(path, text)
    }
}

/// Every change requested for one class, merged across rule files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassRules {
    pub class: BTreeSet<AccessChange>,
    pub methods: BTreeMap<(String, String), BTreeSet<AccessChange>>,
    pub fields: BTreeMap<(String, String), BTreeSet<AccessChange>>,
}

/// Rules collected for one processing run, keyed by class name.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    classes: BTreeMap<String, ClassRules>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the rules of `file`. With `transitive_only` set, only rules
    /// marked `transitive-` are taken.
    pub fn add(&mut self, file: &AccessRuleFile, transitive_only: bool) {
        for rule in &file.rules {
            if transitive_only && !rule.transitive {
                continue;
            }
            let class = self
                .classes
                .entry(rule.target.class_name().to_string())
                .or_default();
            let changes = match &rule.target {
                RuleTarget::Class(_) => &mut class.class,
                RuleTarget::Method { name, descriptor, .. } => class
                    .methods
                    .entry((name.clone(), descriptor.clone()))
                    .or_default(),
                RuleTarget::Field { name, descriptor, .. } => class
                    .fields
                    .entry((name.clone(), descriptor.clone()))
                    .or_default(),
            };
            changes.insert(rule.change);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn get(&self, class: &str) -> Option<&ClassRules> {
        self.classes.get(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&String, &ClassRules)> {
        self.classes.iter()
    }
}
