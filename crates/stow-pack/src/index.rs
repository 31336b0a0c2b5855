use stow_types::ObjectId;

use crate::error::{PackError, PackResult};
use crate::membership::ObjectIdSet;

const INDEX_MAGIC: &[u8; 4] = b"STWI";

/// The only index format version this crate reads and writes.
pub const INDEX_VERSION: u32 = 1;

/// Pack index for fast random-access lookups.
///
/// Layout:
/// - Fan-out table: 256 entries counting objects with first byte <= index
/// - Sorted ObjectId array
/// - CRC32 array (parallel)
/// - Offset array (parallel)
/// - Pack checksum
#[derive(Clone, Debug)]
pub struct PackIndex {
    pub fan_out: [u32; 256],
    pub object_ids: Vec<ObjectId>,
    pub crc32s: Vec<u32>,
    pub offsets: Vec<u64>,
    pub pack_checksum: [u8; 32],
}

impl PackIndex {
    /// Build an index from (id, crc32, offset) entries and a pack checksum.
    pub fn build(mut entries: Vec<(ObjectId, u32, u64)>, pack_checksum: [u8; 32]) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut fan_out = [0u32; 256];
        let mut object_ids = Vec::with_capacity(entries.len());
        let mut crc32s = Vec::with_capacity(entries.len());
        let mut offsets = Vec::with_capacity(entries.len());

        for (id, crc, offset) in &entries {
            fan_out[id.as_bytes()[0] as usize] += 1;
            object_ids.push(*id);
            crc32s.push(*crc);
            offsets.push(*offset);
        }
        for slot in 1..256 {
            fan_out[slot] += fan_out[slot - 1];
        }

        Self {
            fan_out,
            object_ids,
            crc32s,
            offsets,
            pack_checksum,
        }
    }

    /// Position of `id` in the sorted id table.
    pub fn position(&self, id: &ObjectId) -> Option<usize> {
        let first_byte = id.as_bytes()[0] as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fan_out[first_byte - 1] as usize
        };
        let end = self.fan_out[first_byte] as usize;
        self.object_ids[start..end]
            .binary_search(id)
            .ok()
            .map(|pos| start + pos)
    }

    /// Look up an object's (offset, crc32) by ID.
    pub fn lookup(&self, id: &ObjectId) -> Option<(u64, u32)> {
        self.position(id)
            .map(|idx| (self.offsets[idx], self.crc32s[idx]))
    }

    /// Total object count.
    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }

    /// Check if an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.position(id).is_some()
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.object_ids.len();
        let mut buf = Vec::with_capacity(8 + 256 * 4 + count * 44 + 32);
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());
        for &count in &self.fan_out {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        for id in &self.object_ids {
            buf.extend_from_slice(id.as_bytes());
        }
        for &crc in &self.crc32s {
            buf.extend_from_slice(&crc.to_be_bytes());
        }
        for &offset in &self.offsets {
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf.extend_from_slice(&self.pack_checksum);
        buf
    }

    /// Deserialize from bytes.
    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        if data.len() < 8 {
            return Err(PackError::IndexCorrupted("too short".into()));
        }
        if &data[0..4] != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(INDEX_MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(data, 4);
        if version != INDEX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mut pos = 8;
        if data.len() < pos + 256 * 4 {
            return Err(PackError::IndexCorrupted("fan-out truncated".into()));
        }
        let mut fan_out = [0u32; 256];
        for entry in &mut fan_out {
            *entry = read_u32(data, pos);
            pos += 4;
        }
        if fan_out.windows(2).any(|w| w[0] > w[1]) {
            return Err(PackError::IndexCorrupted("fan-out not monotonic".into()));
        }

        let count = fan_out[255] as usize;
        let needed = pos + count * (32 + 4 + 8) + 32;
        if data.len() < needed {
            return Err(PackError::IndexCorrupted("data truncated".into()));
        }

        let mut object_ids = Vec::with_capacity(count);
        for _ in 0..count {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&data[pos..pos + 32]);
            object_ids.push(ObjectId::from_hash(hash));
            pos += 32;
        }

        let mut crc32s = Vec::with_capacity(count);
        for _ in 0..count {
            crc32s.push(read_u32(data, pos));
            pos += 4;
        }

        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[pos..pos + 8]);
            offsets.push(u64::from_be_bytes(raw));
            pos += 8;
        }

        let mut pack_checksum = [0u8; 32];
        pack_checksum.copy_from_slice(&data[pos..pos + 32]);

        Ok(Self {
            fan_out,
            object_ids,
            crc32s,
            offsets,
            pack_checksum,
        })
    }
}

impl ObjectIdSet for PackIndex {
    fn contains(&self, id: &ObjectId) -> bool {
        PackIndex::contains(self, id)
    }
}

/// Big-endian u32 at `pos`. Callers have already bounds-checked.
pub(crate) fn read_u32(data: &[u8], pos: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[pos..pos + 4]);
    u32::from_be_bytes(raw)
}
