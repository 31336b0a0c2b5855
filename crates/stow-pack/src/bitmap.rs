use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use stow_types::ObjectId;

use crate::error::{PackError, PackResult};
use crate::index::PackIndex;

const BITMAP_MAGIC: &[u8; 4] = b"STWB";

/// Reachability bitmaps for selected commits of one pack.
///
/// Bit `i` of a commit's bitmap is set when the object at index position
/// `i` is reachable from that commit. Only objects inside the pack are
/// represented, so bitmaps are only built for packs written from a
/// complete closure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapIndex {
    pack_checksum: [u8; 32],
    object_count: u32,
    commits: BTreeMap<ObjectId, Vec<u64>>,
}

impl BitmapIndex {
    /// Build bitmaps for `commits` over the objects of `index`.
    ///
    /// `links` maps each object in the pack to the ids it references.
    /// Commits that are not in the pack are skipped.
    pub fn build(
        index: &PackIndex,
        commits: &[ObjectId],
        links: &HashMap<ObjectId, Vec<ObjectId>>,
    ) -> Self {
        let count = index.object_count();
        let words = count.div_ceil(64);
        let mut bitmaps = BTreeMap::new();
        for commit in commits {
            if index.position(commit).is_none() {
                continue;
            }
            let mut bits = vec![0u64; words];
            let mut stack = vec![*commit];
            while let Some(id) = stack.pop() {
                let Some(pos) = index.position(&id) else {
                    continue;
                };
                let (word, bit) = (pos / 64, 1u64 << (pos % 64));
                if bits[word] & bit != 0 {
                    continue;
                }
                bits[word] |= bit;
                if let Some(next) = links.get(&id) {
                    stack.extend(next.iter().copied());
                }
            }
            bitmaps.insert(*commit, bits);
        }
        Self {
            pack_checksum: index.pack_checksum,
            object_count: count as u32,
            commits: bitmaps,
        }
    }

    /// Number of commits with a bitmap.
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub fn has_commit(&self, commit: &ObjectId) -> bool {
        self.commits.contains_key(commit)
    }

    /// Whether this bitmap was built for the pack described by `index`.
    pub fn matches(&self, index: &PackIndex) -> bool {
        self.pack_checksum == index.pack_checksum && self.object_count as usize == index.object_count()
    }

    /// Objects reachable from `commit`, or `None` if it has no bitmap.
    pub fn reachable(&self, index: &PackIndex, commit: &ObjectId) -> Option<Vec<ObjectId>> {
        let bits = self.commits.get(commit)?;
        Some(
            index
                .object_ids
                .iter()
                .enumerate()
                .filter(|(pos, _)| bits.get(pos / 64).is_some_and(|w| w & (1 << (pos % 64)) != 0))
                .map(|(_, id)| *id)
                .collect(),
        )
    }

    pub fn to_bytes(&self) -> PackResult<Vec<u8>> {
        let mut buf = BITMAP_MAGIC.to_vec();
        let body = bincode::serialize(self).map_err(|e| PackError::Serialization(e.to_string()))?;
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        if data.len() < 4 || &data[0..4] != BITMAP_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(BITMAP_MAGIC).into(),
                actual: String::from_utf8_lossy(&data[..data.len().min(4)]).into(),
            });
        }
        bincode::deserialize(&data[4..]).map_err(|e| PackError::Serialization(e.to_string()))
    }
}
