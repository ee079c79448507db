use std::collections::BTreeSet;

use super::bytes::{patch_u2, put_u2, put_u4, ByteReader};
use super::rebuild::{Rebuilder, SourceClass};
use crate::core::error::{PipelineError, PipelineResult};

const LDC: u8 = 0x12;
const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;

/// Length in bytes of the instruction starting at `pc`.
fn instruction_length(code: &[u8], pc: usize) -> PipelineResult<usize> {
    let op = code[pc];
    let len = match op {
        0x10 | LDC | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | IINC | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        0xb9 | 0xba | 0xc8 | 0xc9 => 5,
        WIDE => match code.get(pc + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(truncated(pc)),
        },
        TABLESWITCH | LOOKUPSWITCH => {
            let base = pc + 1 + (4 - (pc + 1) % 4) % 4;
            let word = |i: usize| -> PipelineResult<i32> {
                let at = base + i * 4;
                code.get(at..at + 4)
                    .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                    .ok_or_else(|| truncated(pc))
            };
            if op == TABLESWITCH {
                let (low, high) = (word(1)?, word(2)?);
                let n = (high as i64 - low as i64 + 1).max(0) as usize;
                base - pc + 12 + n * 4
            } else {
                let pairs = word(1)?.max(0) as usize;
                base - pc + 8 + pairs * 8
            }
        }
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 | 0xca => 1,
        other => {
            return Err(PipelineError::ClassFormat(format!(
                "unknown opcode {:#04x} at {}",
                other, pc
            )))
        }
    };
    if pc + len > code.len() {
        return Err(truncated(pc));
    }
    Ok(len)
}

fn truncated(pc: usize) -> PipelineError {
    PipelineError::ClassFormat(format!("truncated instruction at {}", pc))
}

/// Split a `Code` attribute into its header values, bytecode and the rest.
fn split_code(info: &[u8]) -> PipelineResult<(u16, u16, &[u8], ByteReader<'_>)> {
    let mut r = ByteReader::new(info);
    let max_stack = r.u2()?;
    let max_locals = r.u2()?;
    let len = r.u4()? as usize;
    let code = r.bytes(len)?;
    Ok((max_stack, max_locals, code, r))
}

/// Collect the pool indices loaded by one-byte `ldc` instructions.
pub(super) fn collect_ldc(info: &[u8], out: &mut BTreeSet<u16>) -> PipelineResult<()> {
    let (_, _, code, _) = split_code(info)?;
    let mut pc = 0;
    while pc < code.len() {
        if code[pc] == LDC {
            out.insert(code[pc + 1] as u16);
        }
        pc += instruction_length(code, pc)?;
    }
    Ok(())
}

impl Rebuilder<'_> {
    pub(super) fn code(&mut self, src: &mut SourceClass<'_>, info: &[u8]) -> PipelineResult<Vec<u8>> {
        let (max_stack, max_locals, code, mut r) = split_code(info)?;

        let mut new_code = code.to_vec();
        let mut pc = 0;
        while pc < code.len() {
            let op = code[pc];
            let len = instruction_length(code, pc)?;
            match op {
                LDC => {
                    let old = code[pc + 1] as u16;
                    let reserved = src.ldc.get(&old).copied();
                    let new = match reserved {
                        Some(slot) => slot,
                        None => self.constant(src, old)?,
                    };
                    if new > u8::MAX as u16 {
                        return Err(PipelineError::transform(
                            "class rebuild",
                            format!("ldc target moved out of range to {}", new),
                        ));
                    }
                    new_code[pc + 1] = new as u8;
                }
                // ldc_w, ldc2_w, field/method refs, invokeinterface,
                // invokedynamic, new, anewarray, checkcast, instanceof,
                // multianewarray
                0x13 | 0x14 | 0xb2..=0xbb | 0xbd | 0xc0 | 0xc1 | 0xc5 => {
                    let old = u16::from_be_bytes([code[pc + 1], code[pc + 2]]);
                    let new = self.constant(src, old)?;
                    patch_u2(&mut new_code, pc + 1, new);
                }
                _ => {}
            }
            pc += len;
        }

        let mut out = Vec::with_capacity(info.len());
        put_u2(&mut out, max_stack);
        put_u2(&mut out, max_locals);
        put_u4(&mut out, new_code.len() as u32);
        out.extend_from_slice(&new_code);

        let handlers = r.u2()?;
        put_u2(&mut out, handlers);
        for _ in 0..handlers {
            put_u2(&mut out, r.u2()?); // start_pc
            put_u2(&mut out, r.u2()?); // end_pc
            put_u2(&mut out, r.u2()?); // handler_pc
            let catch_type = r.u2()?;
            put_u2(&mut out, self.optional_constant(src, catch_type)?);
        }

        let nested = super::read_attributes(&mut r)?;
        let nested = self.attributes(src, &nested)?;
        super::write_attributes(&mut out, &nested);
        Ok(out)
    }

    pub(super) fn stack_map_table(
        &mut self,
        src: &mut SourceClass<'_>,
        info: &[u8],
    ) -> PipelineResult<Vec<u8>> {
        let mut r = ByteReader::new(info);
        let mut out = Vec::with_capacity(info.len());
        let frames = r.u2()?;
        put_u2(&mut out, frames);

        for _ in 0..frames {
            let frame = r.u1()?;
            out.push(frame);
            match frame {
                0..=63 => {}
                64..=127 => self.verification_types(src, &mut r, &mut out, 1)?,
                247 => {
                    put_u2(&mut out, r.u2()?);
                    self.verification_types(src, &mut r, &mut out, 1)?;
                }
                248..=251 => put_u2(&mut out, r.u2()?),
                252..=254 => {
                    put_u2(&mut out, r.u2()?);
                    self.verification_types(src, &mut r, &mut out, (frame - 251) as usize)?;
                }
                255 => {
                    put_u2(&mut out, r.u2()?);
                    let locals = r.u2()?;
                    put_u2(&mut out, locals);
                    self.verification_types(src, &mut r, &mut out, locals as usize)?;
                    let stack = r.u2()?;
                    put_u2(&mut out, stack);
                    self.verification_types(src, &mut r, &mut out, stack as usize)?;
                }
                other => {
                    return Err(PipelineError::ClassFormat(format!(
                        "reserved stack map frame type {}",
                        other
                    )))
                }
            }
        }
        Ok(out)
    }

    fn verification_types(
        &mut self,
        src: &mut SourceClass<'_>,
        r: &mut ByteReader<'_>,
        out: &mut Vec<u8>,
        count: usize,
    ) -> PipelineResult<()> {
        for _ in 0..count {
            let tag = r.u1()?;
            out.push(tag);
            match tag {
                7 => put_u2(out, self.constant(src, r.u2()?)?), // Object
                8 => put_u2(out, r.u2()?),                      // Uninitialized
                0..=6 => {}
                other => {
                    return Err(PipelineError::ClassFormat(format!(
                        "unknown verification type {}",
                        other
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_padding_depends_on_position() {
        // nop; tableswitch with low=0 high=1 starting at pc 1
        let mut code = vec![0x00, TABLESWITCH, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes()); // default
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&1i32.to_be_bytes()); // high
        code.extend_from_slice(&[0; 8]);
        assert_eq!(instruction_length(&code, 1).unwrap(), 3 + 12 + 8);
    }

    #[test]
    fn wide_iinc_is_six_bytes() {
        let code = [WIDE, IINC, 0, 1, 0, 1];
        assert_eq!(instruction_length(&code, 0).unwrap(), 6);
        assert!(instruction_length(&[0xfe], 0).is_err());
    }
}
