use std::collections::HashMap;

use super::bytes::{put_u1, put_u2, put_u4, ByteReader};
use crate::core::error::{PipelineError, PipelineResult};

/// One constant-pool slot. Floats and doubles are kept as raw bits so the
/// pool can be hashed and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Modified UTF-8, stored undecoded.
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
    /// Slot 0, the upper half of a long/double, or a reserved slot.
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A constant pool that can also be appended to. Adds are deduplicated.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            index: HashMap::new(),
        }
    }

    /// Number of slots including slot 0, i.e. the `constant_pool_count`.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, idx: u16) -> PipelineResult<&Constant> {
        match self.entries.get(idx as usize) {
            Some(Constant::Unusable) | None => Err(PipelineError::ClassFormat(format!(
                "invalid constant pool index {}",
                idx
            ))),
            Some(c) => Ok(c),
        }
    }

    pub fn utf8(&self, idx: u16) -> PipelineResult<String> {
        Ok(decode_mutf8(self.utf8_bytes(idx)?))
    }

    pub fn utf8_bytes(&self, idx: u16) -> PipelineResult<&[u8]> {
        match self.get(idx)? {
            Constant::Utf8(b) => Ok(b),
            other => Err(PipelineError::ClassFormat(format!(
                "expected Utf8 at {}, found {:?}",
                idx, other
            ))),
        }
    }

    /// Internal name held by a `Class` constant.
    pub fn class_name(&self, idx: u16) -> PipelineResult<String> {
        match self.get(idx)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(PipelineError::ClassFormat(format!(
                "expected Class at {}, found {:?}",
                idx, other
            ))),
        }
    }

    /// `(name, descriptor)` of a `NameAndType` constant.
    pub fn name_and_type(&self, idx: u16) -> PipelineResult<(String, String)> {
        match self.get(idx)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(PipelineError::ClassFormat(format!(
                "expected NameAndType at {}, found {:?}",
                idx, other
            ))),
        }
    }

    // ── Appending ───────────────────────────────────────

    pub fn add(&mut self, constant: Constant) -> PipelineResult<u16> {
        if let Some(&idx) = self.index.get(&constant) {
            return Ok(idx);
        }
        let wide = constant.is_wide();
        let idx = self.push(constant.clone(), wide)?;
        self.index.insert(constant, idx);
        Ok(idx)
    }

    pub fn add_utf8(&mut self, value: &str) -> PipelineResult<u16> {
        self.add(Constant::Utf8(encode_mutf8(value)))
    }

    pub fn add_class(&mut self, name: &str) -> PipelineResult<u16> {
        let name = self.add_utf8(name)?;
        self.add(Constant::Class(name))
    }

    /// Append `n` placeholder slots and return the first index.
    pub fn reserve(&mut self, n: usize) -> PipelineResult<u16> {
        let first = self.entries.len();
        for _ in 0..n {
            self.push(Constant::Unusable, false)?;
        }
        Ok(first as u16)
    }

    /// Store `constant` into a slot obtained from [`reserve`](Self::reserve).
    pub fn fill(&mut self, slot: u16, constant: Constant) -> PipelineResult<()> {
        match self.entries.get_mut(slot as usize) {
            Some(entry @ Constant::Unusable) if slot != 0 => {
                *entry = constant.clone();
                self.index.entry(constant).or_insert(slot);
                Ok(())
            }
            _ => Err(PipelineError::ClassFormat(format!(
                "slot {} is not a reserved constant",
                slot
            ))),
        }
    }

    fn push(&mut self, constant: Constant, wide: bool) -> PipelineResult<u16> {
        let needed = if wide { 2 } else { 1 };
        if self.entries.len() + needed > u16::MAX as usize {
            return Err(PipelineError::ClassFormat("constant pool overflow".into()));
        }
        let idx = self.entries.len() as u16;
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(idx)
    }

    // ── Serialisation ───────────────────────────────────

    pub(super) fn read(reader: &mut ByteReader<'_>) -> PipelineResult<Self> {
        let count = reader.u2()? as usize;
        let mut pool = ConstantPool::new();
        let mut i = 1;
        while i < count {
            let tag = reader.u1()?;
            let constant = match tag {
                1 => {
                    let len = reader.u2()? as usize;
                    Constant::Utf8(reader.bytes(len)?.to_vec())
                }
                3 => Constant::Integer(reader.u4()? as i32),
                4 => Constant::Float(reader.u4()?),
                5 => Constant::Long(reader.u8()? as i64),
                6 => Constant::Double(reader.u8()?),
                7 => Constant::Class(reader.u2()?),
                8 => Constant::String(reader.u2()?),
                9 => Constant::Fieldref {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                10 => Constant::Methodref {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                11 => Constant::InterfaceMethodref {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                12 => Constant::NameAndType {
                    name: reader.u2()?,
                    descriptor: reader.u2()?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.u1()?,
                    reference: reader.u2()?,
                },
                16 => Constant::MethodType(reader.u2()?),
                17 => Constant::Dynamic {
                    bootstrap: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                19 => Constant::Module(reader.u2()?),
                20 => Constant::Package(reader.u2()?),
                other => {
                    return Err(PipelineError::ClassFormat(format!(
                        "unknown constant tag {} at index {}",
                        other, i
                    )))
                }
            };
            let wide = constant.is_wide();
            let idx = pool.push(constant.clone(), wide)?;
            pool.index.entry(constant).or_insert(idx);
            i += if wide { 2 } else { 1 };
        }
        Ok(pool)
    }

    pub(super) fn write(&self, out: &mut Vec<u8>) -> PipelineResult<()> {
        put_u2(out, self.entries.len() as u16);
        for (idx, constant) in self.entries.iter().enumerate().skip(1) {
            match constant {
                Constant::Utf8(b) => {
                    put_u1(out, 1);
                    put_u2(out, b.len() as u16);
                    out.extend_from_slice(b);
                }
                Constant::Integer(v) => {
                    put_u1(out, 3);
                    put_u4(out, *v as u32);
                }
                Constant::Float(bits) => {
                    put_u1(out, 4);
                    put_u4(out, *bits);
                }
                Constant::Long(v) => {
                    put_u1(out, 5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Double(bits) => {
                    put_u1(out, 6);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Constant::Class(n) => {
                    put_u1(out, 7);
                    put_u2(out, *n);
                }
                Constant::String(n) => {
                    put_u1(out, 8);
                    put_u2(out, *n);
                }
                Constant::Fieldref { class, name_and_type } => {
                    put_u1(out, 9);
                    put_u2(out, *class);
                    put_u2(out, *name_and_type);
                }
                Constant::Methodref { class, name_and_type } => {
                    put_u1(out, 10);
                    put_u2(out, *class);
                    put_u2(out, *name_and_type);
                }
                Constant::InterfaceMethodref { class, name_and_type } => {
                    put_u1(out, 11);
                    put_u2(out, *class);
                    put_u2(out, *name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    put_u1(out, 12);
                    put_u2(out, *name);
                    put_u2(out, *descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    put_u1(out, 15);
                    put_u1(out, *kind);
                    put_u2(out, *reference);
                }
                Constant::MethodType(d) => {
                    put_u1(out, 16);
                    put_u2(out, *d);
                }
                Constant::Dynamic { bootstrap, name_and_type } => {
                    put_u1(out, 17);
                    put_u2(out, *bootstrap);
                    put_u2(out, *name_and_type);
                }
                Constant::InvokeDynamic { bootstrap, name_and_type } => {
                    put_u1(out, 18);
                    put_u2(out, *bootstrap);
                    put_u2(out, *name_and_type);
                }
                Constant::Module(n) => {
                    put_u1(out, 19);
                    put_u2(out, *n);
                }
                Constant::Package(n) => {
                    put_u1(out, 20);
                    put_u2(out, *n);
                }
                Constant::Unusable => {
                    let after_wide = idx > 1 && self.entries[idx - 1].is_wide();
                    if !after_wide {
                        return Err(PipelineError::ClassFormat(format!(
                            "reserved constant slot {} was never filled",
                            idx
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Decode modified UTF-8 (JVMS 4.4.7). Malformed input decodes lossily.
pub fn decode_mutf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

pub fn encode_mutf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutf8_handles_nul_and_supplementary_chars() {
        let s = "a\0b\u{1F600}";
        let encoded = encode_mutf8(s);
        assert_eq!(&encoded[1..3], &[0xC0, 0x80]);
        assert_eq!(decode_mutf8(&encoded), s);
    }

    #[test]
    fn adds_are_deduplicated_and_wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let a = pool.add_utf8("x").unwrap();
        let l = pool.add(Constant::Long(7)).unwrap();
        let b = pool.add_utf8("x").unwrap();
        let next = pool.add_utf8("y").unwrap();
        assert_eq!(a, b);
        assert_eq!(next, l + 2);
    }

    #[test]
    fn unfilled_reservation_cannot_be_written() {
        let mut pool = ConstantPool::new();
        let slot = pool.reserve(1).unwrap();
        assert!(pool.write(&mut Vec::new()).is_err());
        pool.fill(slot, Constant::Integer(1)).unwrap();
        assert!(pool.write(&mut Vec::new()).is_ok());
    }
}
