//! Pack file decoding.
//!
//! A pack is `"PACK"` + big-endian version + big-endian object count,
//! followed by that many entries and a 20-byte SHA-1 trailer over everything
//! before it. Each entry header packs a 3-bit type and a variable-length
//! size into the leading bytes: the first byte contributes 4 size bits,
//! every continuation byte 7 more, least-significant chunk first.
//!
//! Delta entries reference their base by 20-byte id (ref-delta) or by a
//! backward offset from the entry's own start (ofs-delta). Bases may appear
//! later in the stream than their dependents, and chains of deltas are
//! legal, so resolution runs as a fixed-point sweep over an in-memory index
//! after the whole pack has been scanned.
//!
//! See: https://git-scm.com/docs/pack-format

use crate::{delta, Result, TransferError};
use flate2::read::ZlibDecoder;
use grit_storage::{ObjectId, ObjectStore, ObjectType};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Read;

/// Magic bytes at the start of a pack stream.
const PACK_MAGIC: &[u8; 4] = b"PACK";
/// Pack version we support.
const PACK_VERSION: u32 = 2;
/// Trailing SHA-1 checksum length.
const TRAILER_LEN: usize = 20;

/// Entry kinds as tagged in pack headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryType {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

impl PackEntryType {
    /// Parses the 3-bit type tag. Codes 0 and 5 are invalid/reserved.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OfsDelta),
            7 => Ok(Self::RefDelta),
            _ => Err(TransferError::UnsupportedObjectType(code)),
        }
    }

    /// Returns the 3-bit type tag.
    pub fn code(self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta => 6,
            Self::RefDelta => 7,
        }
    }

    /// The storable kind, or None for delta entries.
    pub fn storable(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta | Self::RefDelta => None,
        }
    }
}

/// Extracts the type tag from an entry's first header byte.
fn entry_type(first: u8) -> Result<PackEntryType> {
    PackEntryType::from_code((first >> 4) & 0x07)
}

/// Base reference of an unresolved delta entry.
#[derive(Debug, Clone)]
enum BaseRef {
    /// Ref-delta: base addressed by content id.
    Id(ObjectId),
    /// Ofs-delta: base addressed by its entry start offset in this pack.
    Offset(usize),
}

/// A delta entry awaiting its base.
#[derive(Debug)]
struct PendingDelta {
    /// Start offset of this entry's header in the pack.
    offset: usize,
    base: BaseRef,
    payload: Vec<u8>,
}

/// Decodes a pack stream, persisting every resolved object into a store.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// End of the entry region (trailer excluded).
    fn limit(&self) -> usize {
        self.data.len() - TRAILER_LEN
    }

    fn next_byte(&mut self) -> Result<u8> {
        if self.pos >= self.limit() {
            return Err(TransferError::CorruptEntry(
                "pack truncated mid-entry".into(),
            ));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Entry size varint: 4 bits from the first byte, then 7 per byte.
    fn size_varint(&mut self, first: u8) -> Result<u64> {
        let mut size = u64::from(first & 0x0f);
        let mut shift = 4;
        if first & 0x80 != 0 {
            loop {
                let byte = self.next_byte()?;
                if shift >= 64 {
                    return Err(TransferError::CorruptEntry(
                        "entry size varint exceeds 64 bits".into(),
                    ));
                }
                size |= u64::from(byte & 0x7f) << shift;
                shift += 7;
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }
        Ok(size)
    }

    /// Plain varint (7 bits per byte, least-significant chunk first), used
    /// for the ofs-delta base offset.
    fn offset_varint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.next_byte()?;
            if shift >= 64 {
                return Err(TransferError::CorruptEntry(
                    "base offset varint exceeds 64 bits".into(),
                ));
            }
            value |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// Inflates exactly `size` bytes from the cursor, requiring the
    /// compressed stream to end there, and advances past the consumed
    /// compressed bytes.
    fn inflate_exact(&mut self, size: u64) -> Result<Vec<u8>> {
        let remaining = &self.data[self.pos..self.limit()];
        let mut decoder = ZlibDecoder::new(remaining);
        let mut out = vec![0u8; size as usize];
        decoder
            .read_exact(&mut out)
            .map_err(|e| TransferError::CorruptEntry(format!("inflate failed: {}", e)))?;

        // Drive the inflater to stream end so the zlib trailer is consumed
        // and surplus output is detected.
        let mut probe = [0u8; 1];
        match decoder.read(&mut probe) {
            Ok(0) => {}
            Ok(_) => {
                return Err(TransferError::CorruptEntry(
                    "entry inflates past its declared size".into(),
                ))
            }
            Err(e) => {
                return Err(TransferError::CorruptEntry(format!(
                    "inflate failed at stream end: {}",
                    e
                )))
            }
        }

        self.pos += decoder.total_in() as usize;
        Ok(out)
    }

    /// Parses the pack, writing resolved objects through `store`.
    ///
    /// Returns the ids of all decoded objects: non-delta entries in stream
    /// order, then delta entries in resolution order.
    pub fn parse(&mut self, store: &ObjectStore) -> Result<Vec<ObjectId>> {
        if self.data.len() < 12 + TRAILER_LEN {
            return Err(TransferError::InvalidPackHeader("pack too small".into()));
        }
        if &self.data[0..4] != PACK_MAGIC {
            return Err(TransferError::InvalidPackHeader(
                "missing PACK magic".into(),
            ));
        }
        let version = u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        if version != PACK_VERSION {
            return Err(TransferError::InvalidPackHeader(format!(
                "unsupported version: {}",
                version
            )));
        }
        let declared =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]);
        self.pos = 12;
        tracing::debug!(version, objects = declared, "pack header");

        // Resolved entries by start offset, plus an id -> offset index for
        // ref-delta lookup within the same pack.
        let mut by_offset: HashMap<usize, (ObjectType, Vec<u8>)> = HashMap::new();
        let mut offset_of: HashMap<ObjectId, usize> = HashMap::new();
        let mut pending: Vec<PendingDelta> = Vec::new();
        let mut ids = Vec::with_capacity(declared as usize);

        for index in 0..declared {
            if self.pos >= self.limit() {
                return Err(TransferError::ObjectCountMismatch {
                    declared,
                    decoded: index,
                });
            }
            let entry_start = self.pos;
            let first = self.next_byte()?;
            let kind = entry_type(first)?;
            let size = self.size_varint(first)?;
            tracing::debug!(index, ?kind, size, offset = entry_start, "pack entry");

            match kind {
                PackEntryType::RefDelta => {
                    if self.pos + 20 > self.limit() {
                        return Err(TransferError::CorruptEntry(
                            "truncated ref-delta base id".into(),
                        ));
                    }
                    let mut sha = [0u8; 20];
                    sha.copy_from_slice(&self.data[self.pos..self.pos + 20]);
                    self.pos += 20;
                    let payload = self.inflate_exact(size)?;
                    pending.push(PendingDelta {
                        offset: entry_start,
                        base: BaseRef::Id(ObjectId::from_bytes(sha)),
                        payload,
                    });
                }
                PackEntryType::OfsDelta => {
                    let back = self.offset_varint()? as usize;
                    let base_offset = entry_start.checked_sub(back).ok_or_else(|| {
                        TransferError::CorruptEntry(format!(
                            "ofs-delta offset {} reaches before pack start",
                            back
                        ))
                    })?;
                    let payload = self.inflate_exact(size)?;
                    pending.push(PendingDelta {
                        offset: entry_start,
                        base: BaseRef::Offset(base_offset),
                        payload,
                    });
                }
                _ => {
                    let Some(storable) = kind.storable() else {
                        return Err(TransferError::UnsupportedObjectType(kind.code()));
                    };
                    let payload = self.inflate_exact(size)?;
                    let id = store.write(storable, &payload)?;
                    by_offset.insert(entry_start, (storable, payload));
                    offset_of.insert(id, entry_start);
                    ids.push(id);
                }
            }
        }

        if self.pos != self.limit() {
            // Bytes left over before the trailer: more entries than declared.
            return Err(TransferError::ObjectCountMismatch {
                declared,
                decoded: declared,
            });
        }

        let mut hasher = Sha1::new();
        hasher.update(&self.data[..self.limit()]);
        if hasher.finalize().as_slice() != &self.data[self.limit()..] {
            return Err(TransferError::PackChecksumMismatch);
        }

        self.resolve_deltas(store, pending, &mut by_offset, &mut offset_of, &mut ids)?;
        Ok(ids)
    }

    /// Applies pending deltas to a fixed point, so bases appearing later in
    /// the stream and chains of deltas resolve in dependency order.
    fn resolve_deltas(
        &self,
        store: &ObjectStore,
        mut pending: Vec<PendingDelta>,
        by_offset: &mut HashMap<usize, (ObjectType, Vec<u8>)>,
        offset_of: &mut HashMap<ObjectId, usize>,
        ids: &mut Vec<ObjectId>,
    ) -> Result<()> {
        while !pending.is_empty() {
            let mut unresolved = Vec::new();
            let mut progressed = false;

            for entry in pending {
                let base = match &entry.base {
                    BaseRef::Offset(offset) => by_offset.get(offset).cloned(),
                    BaseRef::Id(id) => offset_of
                        .get(id)
                        .and_then(|offset| by_offset.get(offset))
                        .cloned()
                        .or_else(|| {
                            // Base may pre-exist as a loose object.
                            store.read(id).ok().map(|o| (o.kind, o.data.to_vec()))
                        }),
                };
                match base {
                    Some((kind, base_bytes)) => {
                        let payload = delta::apply(&base_bytes, &entry.payload)?;
                        let id = store.write(kind, &payload)?;
                        tracing::debug!(offset = entry.offset, %id, "resolved delta");
                        by_offset.insert(entry.offset, (kind, payload));
                        offset_of.insert(id, entry.offset);
                        ids.push(id);
                        progressed = true;
                    }
                    None => unresolved.push(entry),
                }
            }

            if !progressed {
                let missing = match &unresolved[0].base {
                    BaseRef::Id(id) => format!("base {} not found", id),
                    BaseRef::Offset(offset) => {
                        format!("no entry at base offset {}", offset)
                    }
                };
                return Err(TransferError::UnresolvedDelta(missing));
            }
            pending = unresolved;
        }
        Ok(())
    }
}



#[cfg(test)]
pub(crate) mod tests_support {
    //! Pack construction helpers shared with other test modules.

    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    pub fn build_blob_pack(payloads: &[Vec<u8>]) -> Vec<u8> {
        let mut pack = PACK_MAGIC.to_vec();
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(payloads.len() as u32).to_be_bytes());
        for payload in payloads {
            let mut first = (PackEntryType::Blob.code() << 4) | (payload.len() & 0x0f) as u8;
            let mut rest = payload.len() >> 4;
            if rest > 0 {
                first |= 0x80;
            }
            pack.push(first);
            while rest > 0 {
                let mut byte = (rest & 0x7f) as u8;
                rest >>= 7;
                if rest > 0 {
                    byte |= 0x80;
                }
                pack.push(byte);
            }
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload).unwrap();
            pack.extend_from_slice(&encoder.finish().unwrap());
        }
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let digest = hasher.finalize();
        pack.extend_from_slice(&digest);
        pack
    }
}
