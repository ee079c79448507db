// ─── Class-file model ───
// Minimal JVM class-file reader/writer used by merge, remap and the
// access-widener. Parsing and writing are byte-exact: a class that is read
// and written back unchanged produces the same bytes.

mod annotations;
mod bytecode;
mod bytes;
pub mod descriptor;
mod pool;
mod rebuild;

pub use annotations::{
    add_invisible_annotations, environment_annotation, environment_interface_annotation,
    environment_interfaces_container, Side,
};
pub use bytes::ByteReader;
pub use pool::{decode_mutf8, encode_mutf8, Constant, ConstantPool};
pub use rebuild::{Identity, InnerClassEntry, NameMapper, Rebuilder, SourceClass};

use bytes::{put_u2, put_u4};

use crate::core::error::{PipelineError, PipelineResult};

pub const MAGIC: u32 = 0xCAFE_BABE;

// ── Access flags ────────────────────────────────────────
pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ENUM: u16 = 0x4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: u16,
    pub info: Vec<u8>,
}

/// A field or a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access: u16,
    pub name: u16,
    pub descriptor: u16,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor: u16,
    pub major: u16,
    pub pool: ConstantPool,
    pub access: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(data: &[u8]) -> PipelineResult<Self> {
        let mut r = ByteReader::new(data);
        if r.u4()? != MAGIC {
            return Err(PipelineError::ClassFormat("bad magic".into()));
        }
        let minor = r.u2()?;
        let major = r.u2()?;
        let pool = ConstantPool::read(&mut r)?;
        let access = r.u2()?;
        let this_class = r.u2()?;
        let super_class = r.u2()?;

        let interface_count = r.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u2()?);
        }

        let fields = read_members(&mut r)?;
        let methods = read_members(&mut r)?;
        let attributes = read_attributes(&mut r)?;

        if !r.is_empty() {
            return Err(PipelineError::ClassFormat(format!(
                "trailing bytes after offset {}",
                r.position()
            )));
        }

        Ok(Self {
            minor,
            major,
            pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> PipelineResult<Vec<u8>> {
        let mut out = Vec::new();
        put_u4(&mut out, MAGIC);
        put_u2(&mut out, self.minor);
        put_u2(&mut out, self.major);
        self.pool.write(&mut out)?;
        put_u2(&mut out, self.access);
        put_u2(&mut out, self.this_class);
        put_u2(&mut out, self.super_class);
        put_u2(&mut out, self.interfaces.len() as u16);
        for i in &self.interfaces {
            put_u2(&mut out, *i);
        }
        write_members(&mut out, &self.fields);
        write_members(&mut out, &self.methods);
        write_attributes(&mut out, &self.attributes);
        Ok(out)
    }

    // ── Queries ─────────────────────────────────────────

    pub fn name(&self) -> PipelineResult<String> {
        self.pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> PipelineResult<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> PipelineResult<Vec<String>> {
        self.interfaces
            .iter()
            .map(|&i| self.pool.class_name(i))
            .collect()
    }

    pub fn member_name(&self, member: &Member) -> PipelineResult<String> {
        self.pool.utf8(member.name)
    }

    pub fn member_descriptor(&self, member: &Member) -> PipelineResult<String> {
        self.pool.utf8(member.descriptor)
    }

    /// `(name, descriptor)` pair identifying a member within its class.
    pub fn member_key(&self, member: &Member) -> PipelineResult<(String, String)> {
        Ok((self.member_name(member)?, self.member_descriptor(member)?))
    }

    pub fn attribute_name(&self, attribute: &Attribute) -> PipelineResult<String> {
        self.pool.utf8(attribute.name)
    }

    pub fn find_attribute<'a>(
        &self,
        attributes: &'a [Attribute],
        name: &str,
    ) -> Option<&'a Attribute> {
        attributes
            .iter()
            .find(|a| self.pool.utf8_bytes(a.name).ok() == Some(name.as_bytes()))
    }

    pub fn is_enum(&self) -> bool {
        self.access & ACC_ENUM != 0
    }

    /// Entries of the class's `InnerClasses` attribute.
    pub fn inner_classes(&self) -> PipelineResult<Vec<InnerClassEntry>> {
        match self.find_attribute(&self.attributes, "InnerClasses") {
            Some(attr) => InnerClassEntry::parse_all(&attr.info),
            None => Ok(Vec::new()),
        }
    }

    // ── Construction ────────────────────────────────────

    /// An empty public class, mostly useful to build fixtures.
    pub fn new_class(name: &str, super_name: Option<&str>) -> PipelineResult<Self> {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class(name)?;
        let super_class = match super_name {
            Some(s) => pool.add_class(s)?,
            None => 0,
        };
        Ok(Self {
            minor: 0,
            major: 52,
            pool,
            access: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    pub fn add_interface(&mut self, name: &str) -> PipelineResult<()> {
        let idx = self.pool.add_class(name)?;
        self.interfaces.push(idx);
        Ok(())
    }

    pub fn add_field(&mut self, access: u16, name: &str, descriptor: &str) -> PipelineResult<()> {
        let member = Member {
            access,
            name: self.pool.add_utf8(name)?,
            descriptor: self.pool.add_utf8(descriptor)?,
            attributes: Vec::new(),
        };
        self.fields.push(member);
        Ok(())
    }

    /// Add a method. `code` is the raw bytecode; abstract methods pass `None`.
    pub fn add_method(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        code: Option<&[u8]>,
    ) -> PipelineResult<()> {
        let mut attributes = Vec::new();
        if let Some(code) = code {
            let mut info = Vec::new();
            put_u2(&mut info, 4); // max_stack
            put_u2(&mut info, 8); // max_locals
            put_u4(&mut info, code.len() as u32);
            info.extend_from_slice(code);
            put_u2(&mut info, 0); // exception table
            put_u2(&mut info, 0); // attributes
            attributes.push(Attribute {
                name: self.pool.add_utf8("Code")?,
                info,
            });
        }
        let member = Member {
            access,
            name: self.pool.add_utf8(name)?,
            descriptor: self.pool.add_utf8(descriptor)?,
            attributes,
        };
        self.methods.push(member);
        Ok(())
    }
}

fn read_members(r: &mut ByteReader<'_>) -> PipelineResult<Vec<Member>> {
    let count = r.u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(Member {
            access: r.u2()?,
            name: r.u2()?,
            descriptor: r.u2()?,
            attributes: read_attributes(r)?,
        });
    }
    Ok(members)
}

pub(crate) fn read_attributes(r: &mut ByteReader<'_>) -> PipelineResult<Vec<Attribute>> {
    let count = r.u2()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = r.u2()?;
        let len = r.u4()? as usize;
        attributes.push(Attribute {
            name,
            info: r.bytes(len)?.to_vec(),
        });
    }
    Ok(attributes)
}

fn write_members(out: &mut Vec<u8>, members: &[Member]) {
    put_u2(out, members.len() as u16);
    for m in members {
        put_u2(out, m.access);
        put_u2(out, m.name);
        put_u2(out, m.descriptor);
        write_attributes(out, &m.attributes);
    }
}

pub(crate) fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) {
    put_u2(out, attributes.len() as u16);
    for a in attributes {
        put_u2(out, a.name);
        put_u4(out, a.info.len() as u32);
        out.extend_from_slice(&a.info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClassFile {
        let mut class = ClassFile::new_class("a/Foo", Some("java/lang/Object")).unwrap();
        class.add_interface("java/lang/Runnable").unwrap();
        class.add_field(ACC_PRIVATE, "count", "I").unwrap();
        class
            .add_method(ACC_PUBLIC, "run", "()V", Some(&[0xb1]))
            .unwrap();
        class
    }

    #[test]
    fn write_then_parse_is_byte_exact() {
        let bytes = sample().to_bytes().unwrap();
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
        assert_eq!(parsed.name().unwrap(), "a/Foo");
        assert_eq!(parsed.super_name().unwrap().as_deref(), Some("java/lang/Object"));
        assert_eq!(parsed.interface_names().unwrap(), vec!["java/lang/Runnable"]);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        assert!(matches!(
            ClassFile::parse(&[0, 0, 0, 0]),
            Err(PipelineError::ClassFormat(_))
        ));
        let bytes = sample().to_bytes().unwrap();
        assert!(ClassFile::parse(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn finds_code_attribute() {
        let class = sample();
        let run = &class.methods[0];
        let code = class.find_attribute(&run.attributes, "Code").unwrap();
        assert_eq!(code.info[8], 0xb1);
    }
}
