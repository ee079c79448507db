use super::bytes::{put_u2, ByteReader};
use super::pool::{Constant, ConstantPool};
use super::rebuild::{Rebuilder, SourceClass};
use super::Attribute;
use crate::core::error::{PipelineError, PipelineResult};

const ENVIRONMENT: &str = "Lnet/fabricmc/api/Environment;";
const ENVIRONMENT_INTERFACE: &str = "Lnet/fabricmc/api/EnvironmentInterface;";
const ENVIRONMENT_INTERFACES: &str = "Lnet/fabricmc/api/EnvironmentInterfaces;";
const ENV_TYPE: &str = "Lnet/fabricmc/api/EnvType;";

/// The side a merged member or interface came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    fn constant_name(self) -> &'static str {
        match self {
            Side::Client => "CLIENT",
            Side::Server => "SERVER",
        }
    }
}

fn env_value(pool: &mut ConstantPool, out: &mut Vec<u8>, side: Side) -> PipelineResult<()> {
    out.push(b'e');
    put_u2(out, pool.add_utf8(ENV_TYPE)?);
    put_u2(out, pool.add_utf8(side.constant_name())?);
    Ok(())
}

/// `@Environment(EnvType.<side>)`
pub fn environment_annotation(pool: &mut ConstantPool, side: Side) -> PipelineResult<Vec<u8>> {
    let mut out = Vec::new();
    put_u2(&mut out, pool.add_utf8(ENVIRONMENT)?);
    put_u2(&mut out, 1);
    put_u2(&mut out, pool.add_utf8("value")?);
    env_value(pool, &mut out, side)?;
    Ok(out)
}

/// `@EnvironmentInterface(value = EnvType.<side>, itf = <interface>.class)`
pub fn environment_interface_annotation(
    pool: &mut ConstantPool,
    side: Side,
    interface: &str,
) -> PipelineResult<Vec<u8>> {
    let mut out = Vec::new();
    put_u2(&mut out, pool.add_utf8(ENVIRONMENT_INTERFACE)?);
    put_u2(&mut out, 2);
    put_u2(&mut out, pool.add_utf8("value")?);
    env_value(pool, &mut out, side)?;
    put_u2(&mut out, pool.add_utf8("itf")?);
    out.push(b'c');
    put_u2(&mut out, pool.add_utf8(&format!("L{};", interface))?);
    Ok(out)
}

/// Wrap several `@EnvironmentInterface` in their repeatable container.
pub fn environment_interfaces_container(
    pool: &mut ConstantPool,
    annotations: &[Vec<u8>],
) -> PipelineResult<Vec<u8>> {
    let mut out = Vec::new();
    put_u2(&mut out, pool.add_utf8(ENVIRONMENT_INTERFACES)?);
    put_u2(&mut out, 1);
    put_u2(&mut out, pool.add_utf8("value")?);
    out.push(b'[');
    put_u2(&mut out, annotations.len() as u16);
    for a in annotations {
        out.push(b'@');
        out.extend_from_slice(a);
    }
    Ok(out)
}

/// Append annotations to the (invisible) annotation attribute of a class or
/// member, creating the attribute when needed.
pub fn add_invisible_annotations(
    pool: &mut ConstantPool,
    attributes: &mut Vec<Attribute>,
    annotations: &[Vec<u8>],
) -> PipelineResult<()> {
    if annotations.is_empty() {
        return Ok(());
    }
    let name = pool.add_utf8("RuntimeInvisibleAnnotations")?;
    let attr = match attributes.iter().position(|a| a.name == name) {
        Some(i) => &mut attributes[i],
        None => {
            attributes.push(Attribute {
                name,
                info: vec![0, 0],
            });
            let last = attributes.len() - 1;
            &mut attributes[last]
        }
    };

    let existing = match attr.info.as_slice() {
        [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
        _ => {
            return Err(PipelineError::ClassFormat(
                "truncated RuntimeInvisibleAnnotations attribute".into(),
            ))
        }
    };
    let total = existing as usize + annotations.len();
    if total > u16::MAX as usize {
        return Err(PipelineError::ClassFormat("too many annotations".into()));
    }
    attr.info[..2].copy_from_slice(&(total as u16).to_be_bytes());
    for a in annotations {
        attr.info.extend_from_slice(a);
    }
    Ok(())
}

impl Rebuilder<'_> {
    /// Relocate `num_annotations` followed by that many annotations.
    pub(super) fn annotations(
        &mut self,
        src: &mut SourceClass<'_>,
        r: &mut ByteReader<'_>,
        out: &mut Vec<u8>,
    ) -> PipelineResult<()> {
        let n = r.u2()?;
        put_u2(out, n);
        for _ in 0..n {
            self.annotation(src, r, out)?;
        }
        Ok(())
    }

    fn annotation(
        &mut self,
        src: &mut SourceClass<'_>,
        r: &mut ByteReader<'_>,
        out: &mut Vec<u8>,
    ) -> PipelineResult<()> {
        put_u2(out, self.utf8_descriptor(src, r.u2()?)?);
        let pairs = r.u2()?;
        put_u2(out, pairs);
        for _ in 0..pairs {
            put_u2(out, self.utf8_raw(src, r.u2()?)?);
            self.element_value(src, r, out)?;
        }
        Ok(())
    }

    pub(super) fn element_value(
        &mut self,
        src: &mut SourceClass<'_>,
        r: &mut ByteReader<'_>,
        out: &mut Vec<u8>,
    ) -> PipelineResult<()> {
        let tag = r.u1()?;
        out.push(tag);
        match tag {
            b's' => put_u2(out, self.utf8_raw(src, r.u2()?)?),
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                let idx = r.u2()?;
                let value = match src.class.pool.get(idx)? {
                    c @ (Constant::Integer(_)
                    | Constant::Float(_)
                    | Constant::Long(_)
                    | Constant::Double(_)) => c.clone(),
                    other => {
                        return Err(PipelineError::ClassFormat(format!(
                            "annotation constant {} is {:?}",
                            idx, other
                        )))
                    }
                };
                put_u2(out, self.pool.add(value)?);
            }
            b'e' => {
                put_u2(out, self.utf8_descriptor(src, r.u2()?)?);
                put_u2(out, self.utf8_raw(src, r.u2()?)?);
            }
            b'c' => put_u2(out, self.utf8_descriptor(src, r.u2()?)?),
            b'@' => self.annotation(src, r, out)?,
            b'[' => {
                let n = r.u2()?;
                put_u2(out, n);
                for _ in 0..n {
                    self.element_value(src, r, out)?;
                }
            }
            other => {
                return Err(PipelineError::ClassFormat(format!(
                    "unknown element value tag {:?}",
                    other as char
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_annotations_append_to_one_attribute() {
        let mut pool = ConstantPool::new();
        let mut attributes = Vec::new();
        let client = environment_annotation(&mut pool, Side::Client).unwrap();
        add_invisible_annotations(&mut pool, &mut attributes, &[client.clone()]).unwrap();
        add_invisible_annotations(&mut pool, &mut attributes, &[client.clone()]).unwrap();

        assert_eq!(attributes.len(), 1);
        let info = &attributes[0].info;
        assert_eq!(u16::from_be_bytes([info[0], info[1]]), 2);
        assert_eq!(info.len(), 2 + client.len() * 2);
    }

    #[test]
    fn interface_annotation_names_the_interface() {
        let mut pool = ConstantPool::new();
        let bytes = environment_interface_annotation(&mut pool, Side::Server, "a/Tickable").unwrap();
        let itf = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
        assert_eq!(pool.utf8(itf).unwrap(), "La/Tickable;");
    }

    #[test]
    fn truncated_attribute_is_a_class_format_error() {
        let mut pool = ConstantPool::new();
        let name = pool.add_utf8("RuntimeInvisibleAnnotations").unwrap();
        let mut attributes = vec![Attribute { name, info: vec![0] }];
        let client = environment_annotation(&mut pool, Side::Client).unwrap();

        let err = add_invisible_annotations(&mut pool, &mut attributes, &[client]).unwrap_err();
        assert!(matches!(err, PipelineError::ClassFormat(_)), "{}", err);
        assert_eq!(attributes[0].info, vec![0]);
    }
}
