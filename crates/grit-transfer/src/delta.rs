//! Pack delta application.
//!
//! A delta payload opens with two varints (expected base size, target size)
//! followed by copy and insert instructions. Copy instructions (MSB set)
//! take an offset from flag bits 0-3 and a length from bits 4-6, one byte
//! per set bit, little-endian; a zero length means 65536. Insert
//! instructions (MSB clear) carry 1-127 literal bytes. Opcode 0 is reserved.

use crate::{Result, TransferError};

/// Reads a little-endian 7-bits-per-byte varint.
fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| TransferError::InvalidDelta("truncated size varint".into()))?;
        *pos += 1;
        if shift >= 64 {
            return Err(TransferError::InvalidDelta(
                "size varint exceeds 64 bits".into(),
            ));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Applies a delta payload against a fully resolved base.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let source_size = read_varint(delta, &mut pos)?;
    if source_size != base.len() as u64 {
        return Err(TransferError::InvalidDelta(format!(
            "base is {} bytes but delta expects {}",
            base.len(),
            source_size
        )));
    }
    let target_size = read_varint(delta, &mut pos)?;

    let mut out = Vec::with_capacity(target_size as usize);
    while pos < delta.len() {
        let opcode = delta[pos];
        pos += 1;
        if opcode & 0x80 != 0 {
            // Copy from base.
            let mut offset: usize = 0;
            for i in 0..4 {
                if opcode & (1 << i) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| {
                        TransferError::InvalidDelta("truncated copy offset".into())
                    })?;
                    pos += 1;
                    offset |= (byte as usize) << (8 * i);
                }
            }
            let mut len: usize = 0;
            for i in 0..3 {
                if opcode & (1 << (4 + i)) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| {
                        TransferError::InvalidDelta("truncated copy length".into())
                    })?;
                    pos += 1;
                    len |= (byte as usize) << (8 * i);
                }
            }
            if len == 0 {
                len = 0x10000;
            }
            let end = offset.checked_add(len).filter(|&e| e <= base.len()).ok_or_else(|| {
                TransferError::InvalidDelta(format!(
                    "copy {}+{} outside base of {} bytes",
                    offset,
                    len,
                    base.len()
                ))
            })?;
            out.extend_from_slice(&base[offset..end]);
        } else if opcode != 0 {
            // Insert literal bytes.
            let len = opcode as usize;
            let end = pos + len;
            if end > delta.len() {
                return Err(TransferError::InvalidDelta("truncated insert data".into()));
            }
            out.extend_from_slice(&delta[pos..end]);
            pos = end;
        } else {
            return Err(TransferError::InvalidDelta("reserved opcode 0".into()));
        }
    }

    if out.len() as u64 != target_size {
        return Err(TransferError::InvalidDelta(format!(
            "delta produced {} bytes, declared {}",
            out.len(),
            target_size
        )));
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod encode {
    //! Minimal delta construction used by decoder tests.

    pub fn varint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                return out;
            }
        }
    }

    pub fn insert(data: &[u8]) -> Vec<u8> {
        assert!(!data.is_empty() && data.len() <= 127);
        let mut out = vec![data.len() as u8];
        out.extend_from_slice(data);
        out
    }

    pub fn copy(offset: usize, len: usize) -> Vec<u8> {
        let mut opcode = 0x80u8;
        let mut tail = Vec::new();
        for i in 0..4 {
            let byte = ((offset >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                opcode |= 1 << i;
                tail.push(byte);
            }
        }
        for i in 0..3 {
            let byte = ((len >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                opcode |= 1 << (4 + i);
                tail.push(byte);
            }
        }
        let mut out = vec![opcode];
        out.extend_from_slice(&tail);
        out
    }

    pub fn delta(base_len: usize, target_len: usize, instructions: &[Vec<u8>]) -> Vec<u8> {
        let mut out = varint(base_len as u64);
        out.extend(varint(target_len as u64));
        for ins in instructions {
            out.extend_from_slice(ins);
        }
        out
    }
}
