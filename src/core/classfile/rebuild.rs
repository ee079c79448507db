use std::collections::{BTreeSet, HashMap};

use super::bytes::{put_u2, ByteReader};
use super::descriptor::{map_class_constant, map_descriptor, map_signature};
use super::pool::{Constant, ConstantPool};
use super::{Attribute, ClassFile, Member};
use crate::core::error::{PipelineError, PipelineResult};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// Renames applied while a class is re-imported. `None` keeps a name.
pub trait NameMapper {
    fn map_class(&self, name: &str) -> Option<String>;
    fn map_field(&self, owner: &str, name: &str, desc: &str) -> Option<String>;
    fn map_method(&self, owner: &str, name: &str, desc: &str) -> Option<String>;
}

/// Keeps every name. Used when classes are only combined, not renamed.
pub struct Identity;

impl NameMapper for Identity {
    fn map_class(&self, _: &str) -> Option<String> {
        None
    }

    fn map_field(&self, _: &str, _: &str, _: &str) -> Option<String> {
        None
    }

    fn map_method(&self, _: &str, _: &str, _: &str) -> Option<String> {
        None
    }
}

/// One row of an `InnerClasses` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner: u16,
    pub outer: u16,
    pub name: u16,
    pub access: u16,
}

impl InnerClassEntry {
    pub fn parse_all(info: &[u8]) -> PipelineResult<Vec<Self>> {
        let mut r = ByteReader::new(info);
        let count = r.u2()?;
        (0..count)
            .map(|_| {
                Ok(Self {
                    inner: r.u2()?,
                    outer: r.u2()?,
                    name: r.u2()?,
                    access: r.u2()?,
                })
            })
            .collect()
    }

    pub fn write_all(entries: &[Self]) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + entries.len() * 8);
        put_u2(&mut out, entries.len() as u16);
        for e in entries {
            put_u2(&mut out, e.inner);
            put_u2(&mut out, e.outer);
            put_u2(&mut out, e.name);
            put_u2(&mut out, e.access);
        }
        out
    }
}

#[derive(Debug, Clone)]
struct BootstrapMethod {
    handle: u16,
    arguments: Vec<u16>,
}

/// A class whose members are being copied into a [`Rebuilder`]'s pool.
pub struct SourceClass<'c> {
    pub class: &'c ClassFile,
    name: String,
    bootstrap: Vec<BootstrapMethod>,
    pending_ldc: BTreeSet<u16>,
    pub(super) ldc: HashMap<u16, u16>,
    memo: HashMap<u16, u16>,
}

impl<'c> SourceClass<'c> {
    /// `methods` are the methods that will be imported; the constants their
    /// one-byte `ldc` instructions load are reserved up front.
    pub fn new<I>(class: &'c ClassFile, methods: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = &'c Member>,
    {
        let mut pending_ldc = BTreeSet::new();
        for method in methods {
            if let Some(code) = class.find_attribute(&method.attributes, "Code") {
                super::bytecode::collect_ldc(&code.info, &mut pending_ldc)?;
            }
        }

        Ok(Self {
            class,
            name: class.name()?,
            bootstrap: parse_bootstrap(class)?,
            pending_ldc,
            ldc: HashMap::new(),
            memo: HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn parse_bootstrap(class: &ClassFile) -> PipelineResult<Vec<BootstrapMethod>> {
    let Some(attr) = class.find_attribute(&class.attributes, "BootstrapMethods") else {
        return Ok(Vec::new());
    };
    let mut r = ByteReader::new(&attr.info);
    let count = r.u2()?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let handle = r.u2()?;
        let n = r.u2()?;
        let mut arguments = Vec::with_capacity(n as usize);
        for _ in 0..n {
            arguments.push(r.u2()?);
        }
        methods.push(BootstrapMethod { handle, arguments });
    }
    Ok(methods)
}

/// Builds a class in a fresh constant pool by importing members from one or
/// more source classes, renaming through a [`NameMapper`] as it goes.
///
/// Every constant-pool reference inside the imported attributes is
/// relocated, so sources with unrelated pools can be combined.
pub struct Rebuilder<'m> {
    pub(super) pool: ConstantPool,
    pub(super) mapper: &'m dyn NameMapper,
    bootstrap: Vec<BootstrapMethod>,
    bootstrap_index: HashMap<(u16, Vec<u16>), u16>,
}

impl<'m> Rebuilder<'m> {
    pub fn new(mapper: &'m dyn NameMapper) -> Self {
        Self {
            pool: ConstantPool::new(),
            mapper,
            bootstrap: Vec::new(),
            bootstrap_index: HashMap::new(),
        }
    }

    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Re-import a whole class through `mapper`.
    pub fn rebuild(class: &ClassFile, mapper: &'m dyn NameMapper) -> PipelineResult<ClassFile> {
        let mut src = SourceClass::new(class, class.methods.iter())?;
        let mut rb = Rebuilder::new(mapper);
        rb.reserve_ldc(&mut [&mut src])?;

        let this_class = rb.constant(&mut src, class.this_class)?;
        let super_class = rb.optional_constant(&mut src, class.super_class)?;
        let interfaces = class
            .interfaces
            .iter()
            .map(|&i| rb.constant(&mut src, i))
            .collect::<PipelineResult<Vec<_>>>()?;
        let fields = class
            .fields
            .iter()
            .map(|f| rb.member(&mut src, f, false))
            .collect::<PipelineResult<Vec<_>>>()?;
        let methods = class
            .methods
            .iter()
            .map(|m| rb.member(&mut src, m, true))
            .collect::<PipelineResult<Vec<_>>>()?;
        let attributes = rb.attributes(&mut src, &class.attributes)?;

        rb.finish(class, this_class, super_class, interfaces, fields, methods, attributes)
    }

    /// Place every `ldc` target of the given sources at the front of the
    /// pool so its index fits the one-byte operand.
    pub fn reserve_ldc(&mut self, sources: &mut [&mut SourceClass<'_>]) -> PipelineResult<()> {
        let total: usize = sources.iter().map(|s| s.pending_ldc.len()).sum();
        if total == 0 {
            return Ok(());
        }
        let first = self.pool.reserve(total)? as usize;
        if first + total - 1 > u8::MAX as usize {
            return Err(PipelineError::transform(
                "class rebuild",
                format!("{} constants are loaded with ldc, at most 255 fit", total),
            ));
        }

        let mut slot = first as u16;
        for src in sources.iter_mut() {
            let pending = std::mem::take(&mut src.pending_ldc);
            for old in pending {
                let constant = self.build_constant(src, old)?;
                self.pool.fill(slot, constant)?;
                src.ldc.insert(old, slot);
                src.memo.insert(old, slot);
                slot += 1;
            }
        }
        Ok(())
    }

    // ── Constants ───────────────────────────────────────

    pub fn utf8(&mut self, value: &str) -> PipelineResult<u16> {
        self.pool.add_utf8(value)
    }

    /// Import a constant whose meaning does not depend on where it is used.
    pub fn constant(&mut self, src: &mut SourceClass<'_>, idx: u16) -> PipelineResult<u16> {
        if let Some(&new) = src.memo.get(&idx) {
            return Ok(new);
        }
        let constant = self.build_constant(src, idx)?;
        let new = self.pool.add(constant)?;
        src.memo.insert(idx, new);
        Ok(new)
    }

    /// Like [`constant`](Self::constant) but `0` stays `0`.
    pub fn optional_constant(&mut self, src: &mut SourceClass<'_>, idx: u16) -> PipelineResult<u16> {
        if idx == 0 {
            Ok(0)
        } else {
            self.constant(src, idx)
        }
    }

    fn build_constant(&mut self, src: &mut SourceClass<'_>, idx: u16) -> PipelineResult<Constant> {
        let class = src.class;
        let pool = &class.pool;
        let constant = match pool.get(idx)?.clone() {
            c @ (Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)) => c,
            Constant::Class(name) => {
                let old = pool.utf8(name)?;
                let mapper = self.mapper;
                let new = match map_class_constant(&old, |n| mapper.map_class(n)) {
                    Some(mapped) => self.pool.add_utf8(&mapped)?,
                    None => self.utf8_raw(src, name)?,
                };
                Constant::Class(new)
            }
            Constant::String(s) => Constant::String(self.utf8_raw(src, s)?),
            Constant::Fieldref { class, name_and_type } => {
                let (class, name_and_type) = self.member_ref(src, class, name_and_type, false)?;
                Constant::Fieldref { class, name_and_type }
            }
            Constant::Methodref { class, name_and_type } => {
                let (class, name_and_type) = self.member_ref(src, class, name_and_type, true)?;
                Constant::Methodref { class, name_and_type }
            }
            Constant::InterfaceMethodref { class, name_and_type } => {
                let (class, name_and_type) = self.member_ref(src, class, name_and_type, true)?;
                Constant::InterfaceMethodref { class, name_and_type }
            }
            Constant::NameAndType { name, descriptor } => Constant::NameAndType {
                name: self.utf8_raw(src, name)?,
                descriptor: self.utf8_descriptor(src, descriptor)?,
            },
            Constant::MethodHandle { kind, reference } => Constant::MethodHandle {
                kind,
                reference: self.constant(src, reference)?,
            },
            Constant::MethodType(desc) => Constant::MethodType(self.utf8_descriptor(src, desc)?),
            Constant::Dynamic { bootstrap, name_and_type } => {
                let (name, desc) = pool.name_and_type(name_and_type)?;
                Constant::Dynamic {
                    bootstrap: self.bootstrap_method(src, bootstrap)?,
                    name_and_type: self.name_and_type(&name, &desc)?,
                }
            }
            Constant::InvokeDynamic { bootstrap, name_and_type } => {
                let (name, desc) = pool.name_and_type(name_and_type)?;
                let name = self.lambda_name(src, bootstrap, &name, &desc)?.unwrap_or(name);
                Constant::InvokeDynamic {
                    bootstrap: self.bootstrap_method(src, bootstrap)?,
                    name_and_type: self.name_and_type(&name, &desc)?,
                }
            }
            Constant::Module(n) => Constant::Module(self.utf8_raw(src, n)?),
            Constant::Package(n) => Constant::Package(self.utf8_raw(src, n)?),
            Constant::Unusable => {
                return Err(PipelineError::ClassFormat(format!(
                    "reference to unusable constant {}",
                    idx
                )))
            }
        };
        Ok(constant)
    }

    fn member_ref(
        &mut self,
        src: &mut SourceClass<'_>,
        class: u16,
        name_and_type: u16,
        is_method: bool,
    ) -> PipelineResult<(u16, u16)> {
        let source = src.class;
        let pool = &source.pool;
        let owner = pool.class_name(class)?;
        let (name, desc) = pool.name_and_type(name_and_type)?;
        let new_name = if is_method {
            self.mapper.map_method(&owner, &name, &desc)
        } else {
            self.mapper.map_field(&owner, &name, &desc)
        }
        .unwrap_or(name);

        let class = self.constant(src, class)?;
        let nat = self.name_and_type(&new_name, &desc)?;
        Ok((class, nat))
    }

    /// Add a `NameAndType` whose descriptor is still in source names.
    fn name_and_type(&mut self, name: &str, desc: &str) -> PipelineResult<u16> {
        let mapper = self.mapper;
        let desc = map_descriptor(desc, |n| mapper.map_class(n));
        let name = self.pool.add_utf8(name)?;
        let descriptor = self.pool.add_utf8(&desc)?;
        self.pool.add(Constant::NameAndType { name, descriptor })
    }

    /// Lambda call sites are named after the functional interface method.
    fn lambda_name(
        &self,
        src: &SourceClass<'_>,
        bootstrap: u16,
        name: &str,
        desc: &str,
    ) -> PipelineResult<Option<String>> {
        let pool = &src.class.pool;
        let Some(bsm) = src.bootstrap.get(bootstrap as usize) else {
            return Err(PipelineError::ClassFormat(format!(
                "bootstrap method {} out of range",
                bootstrap
            )));
        };
        let Constant::MethodHandle { reference, .. } = pool.get(bsm.handle)? else {
            return Ok(None);
        };
        let (Constant::Methodref { class, .. } | Constant::InterfaceMethodref { class, .. }) =
            pool.get(*reference)?
        else {
            return Ok(None);
        };
        if pool.class_name(*class)? != LAMBDA_METAFACTORY {
            return Ok(None);
        }

        let interface = desc
            .rsplit(')')
            .next()
            .and_then(|ret| ret.strip_prefix('L'))
            .and_then(|ret| ret.strip_suffix(';'));
        let sam = match bsm.arguments.first().map(|&a| pool.get(a)) {
            Some(Ok(Constant::MethodType(d))) => Some(pool.utf8(*d)?),
            _ => None,
        };
        Ok(match (interface, sam) {
            (Some(interface), Some(sam)) => self.mapper.map_method(interface, name, &sam),
            _ => None,
        })
    }

    fn bootstrap_method(&mut self, src: &mut SourceClass<'_>, old: u16) -> PipelineResult<u16> {
        let bsm = src.bootstrap.get(old as usize).cloned().ok_or_else(|| {
            PipelineError::ClassFormat(format!("bootstrap method {} out of range", old))
        })?;
        let handle = self.constant(src, bsm.handle)?;
        let arguments = bsm
            .arguments
            .iter()
            .map(|&a| self.constant(src, a))
            .collect::<PipelineResult<Vec<_>>>()?;

        let key = (handle, arguments);
        if let Some(&idx) = self.bootstrap_index.get(&key) {
            return Ok(idx);
        }
        let idx = self.bootstrap.len() as u16;
        self.bootstrap.push(BootstrapMethod {
            handle: key.0,
            arguments: key.1.clone(),
        });
        self.bootstrap_index.insert(key, idx);
        Ok(idx)
    }

    pub(super) fn utf8_raw(&mut self, src: &SourceClass<'_>, idx: u16) -> PipelineResult<u16> {
        let bytes = src.class.pool.utf8_bytes(idx)?.to_vec();
        self.pool.add(Constant::Utf8(bytes))
    }

    pub(super) fn utf8_descriptor(&mut self, src: &SourceClass<'_>, idx: u16) -> PipelineResult<u16> {
        let old = src.class.pool.utf8(idx)?;
        let mapper = self.mapper;
        let new = map_descriptor(&old, |n| mapper.map_class(n));
        if new == old {
            self.utf8_raw(src, idx)
        } else {
            self.pool.add_utf8(&new)
        }
    }

    pub(super) fn utf8_signature(&mut self, src: &SourceClass<'_>, idx: u16) -> PipelineResult<u16> {
        let old = src.class.pool.utf8(idx)?;
        let mapper = self.mapper;
        match map_signature(&old, |n| mapper.map_class(n)) {
            Some(new) if new != old => self.pool.add_utf8(&new),
            _ => self.utf8_raw(src, idx),
        }
    }

    // ── Members and attributes ──────────────────────────

    pub fn member(
        &mut self,
        src: &mut SourceClass<'_>,
        member: &Member,
        is_method: bool,
    ) -> PipelineResult<Member> {
        let class = src.class;
        let pool = &class.pool;
        let old_name = pool.utf8(member.name)?;
        let desc = pool.utf8(member.descriptor)?;
        let mapped = if is_method {
            self.mapper.map_method(&src.name, &old_name, &desc)
        } else {
            self.mapper.map_field(&src.name, &old_name, &desc)
        };
        let name = match mapped {
            Some(n) => self.pool.add_utf8(&n)?,
            None => self.utf8_raw(src, member.name)?,
        };

        Ok(Member {
            access: member.access,
            name,
            descriptor: self.utf8_descriptor(src, member.descriptor)?,
            attributes: self.attributes(src, &member.attributes)?,
        })
    }

    /// Import an `InnerClasses` row. The simple name follows a renamed class.
    pub fn inner_class(
        &mut self,
        src: &mut SourceClass<'_>,
        entry: &InnerClassEntry,
    ) -> PipelineResult<InnerClassEntry> {
        let class = src.class;
        let pool = &class.pool;
        let name = if entry.name == 0 {
            0
        } else {
            let inner = pool.class_name(entry.inner)?;
            match self.mapper.map_class(&inner) {
                Some(mapped) => {
                    let outer_prefix = match entry.outer {
                        0 => None,
                        o => {
                            let outer = pool.class_name(o)?;
                            Some(format!("{}$", self.mapper.map_class(&outer).unwrap_or(outer)))
                        }
                    };
                    let simple = outer_prefix
                        .as_deref()
                        .and_then(|p| mapped.strip_prefix(p))
                        .or_else(|| mapped.rsplit('$').next())
                        .unwrap_or(&mapped)
                        .to_string();
                    self.pool.add_utf8(&simple)?
                }
                None => self.utf8_raw(src, entry.name)?,
            }
        };

        Ok(InnerClassEntry {
            inner: self.constant(src, entry.inner)?,
            outer: self.optional_constant(src, entry.outer)?,
            name,
            access: entry.access,
        })
    }

    /// Relocate attributes. Attributes this engine does not understand are
    /// dropped, as their contents may hold stale pool indices.
    pub fn attributes(
        &mut self,
        src: &mut SourceClass<'_>,
        attributes: &[Attribute],
    ) -> PipelineResult<Vec<Attribute>> {
        let mut out = Vec::with_capacity(attributes.len());
        for attr in attributes {
            let name = src.class.pool.utf8(attr.name)?;
            if let Some(info) = self.attribute(src, &name, &attr.info)? {
                out.push(Attribute {
                    name: self.pool.add_utf8(&name)?,
                    info,
                });
            }
        }
        Ok(out)
    }

    fn attribute(
        &mut self,
        src: &mut SourceClass<'_>,
        name: &str,
        info: &[u8],
    ) -> PipelineResult<Option<Vec<u8>>> {
        let mut r = ByteReader::new(info);
        let mut out = Vec::with_capacity(info.len());

        match name {
            "Code" => return self.code(src, info).map(Some),
            "StackMapTable" => return self.stack_map_table(src, info).map(Some),
            "ConstantValue" | "NestHost" => {
                put_u2(&mut out, self.constant(src, r.u2()?)?);
            }
            "Signature" => put_u2(&mut out, self.utf8_signature(src, r.u2()?)?),
            "SourceFile" => put_u2(&mut out, self.utf8_raw(src, r.u2()?)?),
            "Exceptions" | "NestMembers" | "PermittedSubclasses" => {
                let n = r.u2()?;
                put_u2(&mut out, n);
                for _ in 0..n {
                    put_u2(&mut out, self.constant(src, r.u2()?)?);
                }
            }
            "InnerClasses" => {
                let entries = InnerClassEntry::parse_all(info)?
                    .iter()
                    .map(|e| self.inner_class(src, e))
                    .collect::<PipelineResult<Vec<_>>>()?;
                out = InnerClassEntry::write_all(&entries);
            }
            "EnclosingMethod" => {
                let class = r.u2()?;
                let method = r.u2()?;
                let new_method = if method == 0 {
                    0
                } else {
                    let source = src.class;
                    let owner = source.pool.class_name(class)?;
                    let (m, desc) = source.pool.name_and_type(method)?;
                    let m = self.mapper.map_method(&owner, &m, &desc).unwrap_or(m);
                    self.name_and_type(&m, &desc)?
                };
                put_u2(&mut out, self.constant(src, class)?);
                put_u2(&mut out, new_method);
            }
            "Record" => {
                let n = r.u2()?;
                put_u2(&mut out, n);
                for _ in 0..n {
                    let name = r.u2()?;
                    let descriptor = r.u2()?;
                    let nested = super::read_attributes(&mut r)?;
                    let component = Member {
                        access: 0,
                        name,
                        descriptor,
                        attributes: nested,
                    };
                    let imported = self.member(src, &component, false)?;
                    put_u2(&mut out, imported.name);
                    put_u2(&mut out, imported.descriptor);
                    super::write_attributes(&mut out, &imported.attributes);
                }
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                self.annotations(src, &mut r, &mut out)?;
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let n = r.u1()?;
                out.push(n);
                for _ in 0..n {
                    self.annotations(src, &mut r, &mut out)?;
                }
            }
            "AnnotationDefault" => self.element_value(src, &mut r, &mut out)?,
            "MethodParameters" => {
                let n = r.u1()?;
                out.push(n);
                for _ in 0..n {
                    let name = r.u2()?;
                    let flags = r.u2()?;
                    let name = if name == 0 { 0 } else { self.utf8_raw(src, name)? };
                    put_u2(&mut out, name);
                    put_u2(&mut out, flags);
                }
            }
            "LocalVariableTable" | "LocalVariableTypeTable" => {
                let generic = name == "LocalVariableTypeTable";
                let n = r.u2()?;
                put_u2(&mut out, n);
                for _ in 0..n {
                    put_u2(&mut out, r.u2()?); // start_pc
                    put_u2(&mut out, r.u2()?); // length
                    put_u2(&mut out, self.utf8_raw(src, r.u2()?)?);
                    let desc = r.u2()?;
                    let desc = if generic {
                        self.utf8_signature(src, desc)?
                    } else {
                        self.utf8_descriptor(src, desc)?
                    };
                    put_u2(&mut out, desc);
                    put_u2(&mut out, r.u2()?); // index
                }
            }
            "LineNumberTable" | "SourceDebugExtension" | "Deprecated" | "Synthetic" => {
                return Ok(Some(info.to_vec()));
            }
            // Regenerated by `finish` from the imported call sites.
            "BootstrapMethods" => return Ok(None),
            _ => return Ok(None),
        }
        Ok(Some(out))
    }

    /// Assemble the class. `template` supplies version and access flags.
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        mut self,
        template: &ClassFile,
        this_class: u16,
        super_class: u16,
        interfaces: Vec<u16>,
        fields: Vec<Member>,
        methods: Vec<Member>,
        mut attributes: Vec<Attribute>,
    ) -> PipelineResult<ClassFile> {
        if !self.bootstrap.is_empty() {
            let mut info = Vec::new();
            put_u2(&mut info, self.bootstrap.len() as u16);
            for bsm in &self.bootstrap {
                put_u2(&mut info, bsm.handle);
                put_u2(&mut info, bsm.arguments.len() as u16);
                for &a in &bsm.arguments {
                    put_u2(&mut info, a);
                }
            }
            attributes.push(Attribute {
                name: self.pool.add_utf8("BootstrapMethods")?,
                info,
            });
        }

        Ok(ClassFile {
            minor: template.minor,
            major: template.major,
            pool: self.pool,
            access: template.access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classfile::ACC_PUBLIC;

    struct Rename;

    impl NameMapper for Rename {
        fn map_class(&self, name: &str) -> Option<String> {
            (name == "a").then(|| "game/World".to_string())
        }

        fn map_field(&self, owner: &str, name: &str, _: &str) -> Option<String> {
            (owner == "a" && name == "b").then(|| "seed".to_string())
        }

        fn map_method(&self, owner: &str, name: &str, _: &str) -> Option<String> {
            (owner == "a" && name == "c").then(|| "tick".to_string())
        }
    }

    fn class_with_references() -> ClassFile {
        let mut class = ClassFile::new_class("a", Some("java/lang/Object")).unwrap();
        class.add_field(0, "b", "J").unwrap();
        let field_ref = {
            let pool = &mut class.pool;
            let owner = pool.add_class("a").unwrap();
            let name = pool.add_utf8("b").unwrap();
            let desc = pool.add_utf8("J").unwrap();
            let nat = pool
                .add(Constant::NameAndType { name, descriptor: desc })
                .unwrap();
            pool.add(Constant::Fieldref {
                class: owner,
                name_and_type: nat,
            })
            .unwrap()
        };
        let [hi, lo] = field_ref.to_be_bytes();
        // aload_0; getfield a.b; pop2; return
        class
            .add_method(ACC_PUBLIC, "c", "(La;)V", Some(&[0x2a, 0xb4, hi, lo, 0x58, 0xb1]))
            .unwrap();
        class
    }

    #[test]
    fn identity_rebuild_preserves_names() {
        let class = class_with_references();
        let rebuilt = Rebuilder::rebuild(&class, &Identity).unwrap();
        let bytes = rebuilt.to_bytes().unwrap();
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.name().unwrap(), "a");
        assert_eq!(parsed.member_key(&parsed.methods[0]).unwrap().1, "(La;)V");
    }

    #[test]
    fn rename_updates_declarations_and_references() {
        let class = class_with_references();
        let rebuilt = Rebuilder::rebuild(&class, &Rename).unwrap();
        assert_eq!(rebuilt.name().unwrap(), "game/World");
        assert_eq!(rebuilt.member_name(&rebuilt.fields[0]).unwrap(), "seed");
        let (name, desc) = rebuilt.member_key(&rebuilt.methods[0]).unwrap();
        assert_eq!(name, "tick");
        assert_eq!(desc, "(Lgame/World;)V");

        // The getfield operand now points at the renamed field.
        let code = rebuilt
            .find_attribute(&rebuilt.methods[0].attributes, "Code")
            .unwrap();
        let idx = u16::from_be_bytes([code.info[10], code.info[11]]);
        match rebuilt.pool.get(idx).unwrap() {
            Constant::Fieldref { class, name_and_type } => {
                assert_eq!(rebuilt.pool.class_name(*class).unwrap(), "game/World");
                let (n, d) = rebuilt.pool.name_and_type(*name_and_type).unwrap();
                assert_eq!((n.as_str(), d.as_str()), ("seed", "J"));
            }
            other => panic!("unexpected constant {:?}", other),
        }
    }

    fn class_loading_ints(name: &str, count: i32) -> ClassFile {
        let mut class = ClassFile::new_class(name, Some("java/lang/Object")).unwrap();
        let mut code = Vec::new();
        for i in 0..count {
            let idx = class.pool.add(Constant::Integer(1000 + i)).unwrap();
            code.extend_from_slice(&[0x12, idx as u8, 0x57]); // ldc; pop
        }
        code.push(0xb1);
        class.add_method(ACC_PUBLIC, "m", "()V", Some(&code)).unwrap();
        class
    }

    #[test]
    fn ldc_targets_are_placed_first() {
        let mut class = ClassFile::new_class("a", Some("java/lang/Object")).unwrap();
        for i in 0..200 {
            class.pool.add_utf8(&format!("filler{}", i)).unwrap();
        }
        let text = class.pool.add_utf8("hello").unwrap();
        let string = class.pool.add(Constant::String(text)).unwrap();
        assert!(string > 200);
        class
            .add_method(ACC_PUBLIC, "m", "()V", Some(&[0x12, string as u8, 0x57, 0xb1]))
            .unwrap();

        let rebuilt = Rebuilder::rebuild(&class, &Identity).unwrap();
        let code = rebuilt
            .find_attribute(&rebuilt.methods[0].attributes, "Code")
            .unwrap();
        assert_eq!(code.info[9], 1);
        match rebuilt.pool.get(1).unwrap() {
            Constant::String(s) => assert_eq!(rebuilt.pool.utf8(*s).unwrap(), "hello"),
            other => panic!("unexpected constant {:?}", other),
        }
    }

    #[test]
    fn too_many_ldc_targets_is_a_transform_error() {
        let a = class_loading_ints("a", 200);
        let b = class_loading_ints("b", 100);
        let mut src_a = SourceClass::new(&a, a.methods.iter()).unwrap();
        let mut src_b = SourceClass::new(&b, b.methods.iter()).unwrap();

        let mut rb = Rebuilder::new(&Identity);
        let err = rb.reserve_ldc(&mut [&mut src_a, &mut src_b]).unwrap_err();
        assert!(matches!(err, PipelineError::Transform { .. }));
    }
}
