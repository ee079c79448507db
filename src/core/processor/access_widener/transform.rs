use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::{debug, warn};

use super::rules::{AccessChange, RuleSet};
use crate::core::archive::{self, EntryTransform};
use crate::core::classfile::{
    ClassFile, InnerClassEntry, ACC_FINAL, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC,
};
use crate::core::error::{PipelineError, PipelineResult};

const STAGE: &str = "access widener";

fn make_public(access: u16) -> u16 {
    (access & !(ACC_PRIVATE | ACC_PROTECTED)) | ACC_PUBLIC
}

fn make_protected(access: u16) -> u16 {
    if access & ACC_PUBLIC != 0 {
        access
    } else {
        (access & !ACC_PRIVATE) | ACC_PROTECTED
    }
}

fn class_access(mut access: u16, changes: &BTreeSet<AccessChange>) -> u16 {
    if changes.contains(&AccessChange::Accessible) {
        access = make_public(access);
    }
    if changes.contains(&AccessChange::Extendable) {
        access = make_public(access) & !ACC_FINAL;
    }
    access
}

fn method_access(mut access: u16, name: &str, changes: &BTreeSet<AccessChange>) -> u16 {
    if changes.contains(&AccessChange::Accessible) {
        // A private instance method turned public must not start overriding.
        let seal = access & ACC_PRIVATE != 0 && access & ACC_STATIC == 0 && name != "<init>";
        access = make_public(access);
        if seal {
            access |= ACC_FINAL;
        }
    }
    if changes.contains(&AccessChange::Extendable) {
        access = make_protected(access) & !ACC_FINAL;
    }
    access
}

fn field_access(mut access: u16, changes: &BTreeSet<AccessChange>) -> u16 {
    if changes.contains(&AccessChange::Accessible) {
        access = make_public(access);
    }
    if changes.contains(&AccessChange::Mutable) {
        access &= !ACC_FINAL;
    }
    access
}

/// Apply `rules` to one class. Inner-class rows of classes with class rules
/// are updated too, wherever they appear.
pub fn transform_class(bytes: &[u8], rules: &RuleSet) -> PipelineResult<Vec<u8>> {
    let mut class = ClassFile::parse(bytes)?;
    let name = class.name()?;

    if let Some(own) = rules.get(&name) {
        class.access = class_access(class.access, &own.class);

        for i in 0..class.methods.len() {
            let key = class.member_key(&class.methods[i])?;
            if let Some(changes) = own.methods.get(&key) {
                let method = &mut class.methods[i];
                method.access = method_access(method.access, &key.0, changes);
            }
        }
        for i in 0..class.fields.len() {
            let key = class.member_key(&class.fields[i])?;
            if let Some(changes) = own.fields.get(&key) {
                let field = &mut class.fields[i];
                field.access = field_access(field.access, changes);
            }
        }
    }

    let mut rows = class.inner_classes()?;
    let mut changed = false;
    for row in &mut rows {
        let inner = class.pool.class_name(row.inner)?;
        if let Some(inner_rules) = rules.get(&inner).filter(|r| !r.class.is_empty()) {
            row.access = class_access(row.access, &inner_rules.class);
            changed = true;
        }
    }
    if changed {
        let info = InnerClassEntry::write_all(&rows);
        for attr in &mut class.attributes {
            if class.pool.utf8(attr.name)? == "InnerClasses" {
                attr.info = info;
                break;
            }
        }
    }

    class.to_bytes()
}

/// Rewrite every class a rule names, plus the outer classes of ruled inner
/// classes, inside `jar`. Returns how many entries were rewritten.
///
/// With `require_all`, a ruled class missing from the jar is an error;
/// otherwise it is skipped, which is what the halves of a split need.
pub fn apply_rules(jar: &Path, rules: &RuleSet, require_all: bool) -> PipelineResult<usize> {
    let present: BTreeSet<String> = archive::open(jar)?
        .file_names()
        .map(str::to_string)
        .collect();

    let mut targets = BTreeSet::new();
    for (class, class_rules) in rules.classes() {
        let entry = format!("{}.class", class);
        if !present.contains(&entry) {
            if !require_all {
                debug!("{} is not in {:?}, skipping its access rules", class, jar);
                continue;
            }
            return Err(PipelineError::transform(
                STAGE,
                format!("{} is named by an access rule but is not in {:?}", class, jar),
            ));
        }
        targets.insert(entry);

        if class_rules.class.is_empty() {
            continue;
        }
        let mut outer = class.as_str();
        while let Some((parent, _)) = outer.rsplit_once('$') {
            let entry = format!("{}.class", parent);
            if present.contains(&entry) {
                targets.insert(entry);
            } else {
                warn!("Outer class {} of {} not found", parent, class);
            }
            outer = parent;
        }
    }

    let transforms: HashMap<String, EntryTransform<'_>> = targets
        .into_iter()
        .map(|entry| {
            let name = entry.clone();
            let transform: EntryTransform<'_> = Box::new(move |bytes| {
                debug!("Applying access rules to {}", name);
                transform_class(&bytes, rules)
                    .map_err(|e| PipelineError::transform(STAGE, format!("{}: {}", name, e)))
            });
            (entry, transform)
        })
        .collect();

    let replaced = archive::transform(jar, transforms)?;
    Ok(replaced.len())
}

#[cfg(test)]
mod tests {
    use super::super::rules::parse_access_widener;
    use super::*;
    use crate::core::archive::test_support::jar;
    use crate::core::classfile::ACC_SUPER;

    fn rules(text: &str) -> RuleSet {
        let mut set = RuleSet::new();
        set.add(&parse_access_widener("test.aw", text).unwrap(), false);
        set
    }

    fn world() -> Vec<u8> {
        let mut c = ClassFile::new_class("game/World", Some("java/lang/Object")).unwrap();
        c.access = ACC_SUPER | ACC_FINAL;
        c.add_field(ACC_PRIVATE | ACC_FINAL, "seed", "J").unwrap();
        c.add_method(ACC_PRIVATE, "tick", "()V", Some(&[0xb1])).unwrap();
        c.add_method(ACC_PRIVATE | ACC_STATIC, "create", "()V", Some(&[0xb1])).unwrap();
        c.add_method(ACC_PUBLIC | ACC_FINAL, "save", "()V", Some(&[0xb1])).unwrap();
        c.to_bytes().unwrap()
    }

    #[test]
    fn widens_class_members() {
        let set = rules(
            "accessWidener v1 named
extendable class game/World
accessible method game/World tick ()V
accessible method game/World create ()V
extendable method game/World save ()V
accessible field game/World seed J
mutable field game/World seed J
",
        );
        let out = ClassFile::parse(&transform_class(&world(), &set).unwrap()).unwrap();
        assert_eq!(out.access & (ACC_PUBLIC | ACC_FINAL), ACC_PUBLIC);
        assert_eq!(out.fields[0].access, ACC_PUBLIC);
        // Private instance method: public and sealed.
        assert_eq!(out.methods[0].access, ACC_PUBLIC | ACC_FINAL);
        assert_eq!(out.methods[1].access, ACC_PUBLIC | ACC_STATIC);
        assert_eq!(out.methods[2].access, ACC_PUBLIC);
    }

    #[test]
    fn inner_class_rows_follow_class_rules() {
        let mut outer = ClassFile::new_class("game/World", Some("java/lang/Object")).unwrap();
        let inner = outer.pool.add_class("game/World$Chunk").unwrap();
        let outer_idx = outer.this_class;
        let name = outer.pool.add_utf8("Chunk").unwrap();
        let attr_name = outer.pool.add_utf8("InnerClasses").unwrap();
        outer.attributes.push(crate::core::classfile::Attribute {
            name: attr_name,
            info: InnerClassEntry::write_all(&[InnerClassEntry {
                inner,
                outer: outer_idx,
                name,
                access: ACC_PRIVATE | ACC_STATIC,
            }]),
        });
        let chunk = ClassFile::new_class("game/World$Chunk", Some("java/lang/Object"))
            .unwrap()
            .to_bytes()
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.jar");
        jar(
            &path,
            &[
                ("game/World.class", &outer.to_bytes().unwrap()),
                ("game/World$Chunk.class", &chunk),
                ("game/Other.class", b"untouched"),
            ],
        );

        let set = rules("accessWidener v1 named\naccessible class game/World$Chunk\n");
        assert_eq!(apply_rules(&path, &set, true).unwrap(), 2);

        let entries = archive::read_entries(&path).unwrap();
        assert_eq!(entries["game/Other.class"], b"untouched");
        let world = ClassFile::parse(&entries["game/World.class"]).unwrap();
        assert_eq!(world.inner_classes().unwrap()[0].access, ACC_PUBLIC | ACC_STATIC);
    }

    #[test]
    fn rule_for_missing_class_is_a_transform_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.jar");
        jar(&path, &[("game/World.class", &world())]);
        let before = std::fs::read(&path).unwrap();

        let set = rules("accessWidener v1 named\naccessible class game/Missing\n");
        let err = apply_rules(&path, &set, true).unwrap_err();
        assert!(matches!(err, PipelineError::Transform { stage: STAGE, .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);

        assert_eq!(apply_rules(&path, &set, false).unwrap(), 0);
    }
}
