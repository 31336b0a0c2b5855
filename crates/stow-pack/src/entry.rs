use stow_store::{ObjectKind, StoredObject};
use stow_types::ObjectId;

/// An object entry exactly as it is encoded in some pack.
///
/// Raw entries are copied into a new pack without decompressing, which is
/// how unreachable objects are carried forward cheaply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// The zstd stream as stored in the source pack.
    pub compressed: Vec<u8>,
    /// CRC32 of `compressed`.
    pub crc32: u32,
}

impl RawEntry {
    /// Check the stored CRC against the compressed bytes.
    pub fn crc_matches(&self) -> bool {
        crc32fast::hash(&self.compressed) == self.crc32
    }
}

/// A single entry queued for a pack file.
#[derive(Clone, Debug)]
pub enum PackEntry {
    /// Object to be compressed at write time.
    Full { id: ObjectId, object: StoredObject },
    /// Pre-encoded entry reused from another pack.
    Raw(RawEntry),
}

impl PackEntry {
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Full { id, .. } => *id,
            Self::Raw(raw) => raw.id,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Full { object, .. } => object.kind,
            Self::Raw(raw) => raw.kind,
        }
    }

    /// Whether the encoding is copied from an existing pack.
    pub fn is_reused(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}
