use std::path::Path;

use stow_store::{ObjectKind, StoredObject};
use stow_types::ObjectId;

use crate::entry::RawEntry;
use crate::error::{PackError, PackResult};
use crate::index::{read_u32, PackIndex};
use crate::writer::{decode_varint, PACK_MAGIC, PACK_VERSION};

const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 32;

/// Reads objects from a pack file using an index for random access.
///
/// The whole pack is held in memory; no file handle stays open after
/// [`PackReader::open`] returns.
#[derive(Debug)]
pub struct PackReader {
    pack_data: Vec<u8>,
    index: PackIndex,
}

impl PackReader {
    /// Open from raw bytes, verifying header and trailer checksum.
    pub fn from_bytes(pack_data: Vec<u8>, index: PackIndex) -> PackResult<Self> {
        if pack_data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &pack_data[0..4] != PACK_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(PACK_MAGIC).into(),
                actual: String::from_utf8_lossy(&pack_data[0..4]).into(),
            });
        }
        let version = read_u32(&pack_data, 4);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = read_u32(&pack_data, 8) as usize;
        if count != index.object_count() {
            return Err(PackError::IndexCorrupted(format!(
                "pack holds {count} objects, index lists {}",
                index.object_count()
            )));
        }
        let body_end = pack_data.len() - TRAILER_LEN;
        let checksum = blake3::hash(&pack_data[..body_end]);
        if checksum.as_bytes()[..] != pack_data[body_end..] || *checksum.as_bytes() != index.pack_checksum {
            return Err(PackError::ChecksumMismatch);
        }
        Ok(Self { pack_data, index })
    }

    /// Open a `.pack` file and its sibling `.idx`.
    pub fn open(pack_path: &Path) -> PackResult<Self> {
        let pack_data = std::fs::read(pack_path)?;
        let index_data = std::fs::read(pack_path.with_extension("idx"))?;
        let index = PackIndex::from_bytes(&index_data)?;
        Self::from_bytes(pack_data, index)
    }

    /// Read an object by ID.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<StoredObject>> {
        let Some(raw) = self.read_raw(id)? else {
            return Ok(None);
        };
        let data = zstd::decode_all(raw.compressed.as_slice())
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if data.len() as u64 != raw.size {
            return Err(PackError::CorruptEntry {
                offset: self.index.lookup(id).map_or(0, |(offset, _)| offset),
                reason: format!("size mismatch: expected {}, got {}", raw.size, data.len()),
            });
        }
        Ok(Some(StoredObject::new(raw.kind, data)))
    }

    /// Read an entry in its stored encoding, without decompressing it.
    pub fn read_raw(&self, id: &ObjectId) -> PackResult<Option<RawEntry>> {
        let Some((offset, expected_crc)) = self.index.lookup(id) else {
            return Ok(None);
        };
        let data = &self.pack_data[..self.pack_data.len() - TRAILER_LEN];
        let mut pos = offset as usize;
        if pos < HEADER_LEN || pos >= data.len() {
            return Err(PackError::CorruptEntry {
                offset,
                reason: "offset outside pack data".into(),
            });
        }

        let type_byte = data[pos];
        pos += 1;
        let kind = ObjectKind::from_type_byte(type_byte).ok_or_else(|| PackError::CorruptEntry {
            offset,
            reason: format!("unknown type byte: {type_byte}"),
        })?;

        let (size, consumed) = decode_varint(&data[pos..])?;
        pos += consumed;
        let (compressed_size, consumed) = decode_varint(&data[pos..])?;
        pos += consumed;

        let end = pos
            .checked_add(compressed_size as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "compressed data extends beyond pack".into(),
            })?;
        let compressed = data[pos..end].to_vec();
        let crc32 = crc32fast::hash(&compressed);
        if crc32 != expected_crc {
            return Err(PackError::CrcMismatch { id: *id });
        }
        Ok(Some(RawEntry {
            id: *id,
            kind,
            size,
            compressed,
            crc32,
        }))
    }

    /// Check containment.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// Object count.
    pub fn object_count(&self) -> usize {
        self.index.object_count()
    }

    /// Access the index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// All object IDs, sorted.
    pub fn object_ids(&self) -> &[ObjectId] {
        &self.index.object_ids
    }

    /// Size of the pack data in bytes.
    pub fn pack_size(&self) -> u64 {
        self.pack_data.len() as u64
    }
}
