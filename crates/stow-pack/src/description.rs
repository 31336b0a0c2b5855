use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};
use crate::index::INDEX_VERSION;
use crate::stats::PackStatistics;

/// How a pack came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PackSource {
    /// Written directly by an object inserter.
    Insert,
    /// Received from a remote.
    Receive,
    /// Produced by compacting small packs.
    Compact,
    /// Reachable objects rewritten by garbage collection.
    Gc,
    /// Unreachable objects preserved by garbage collection.
    UnreachableGarbage,
}

impl PackSource {
    pub const ALL: [PackSource; 5] = [
        Self::Insert,
        Self::Receive,
        Self::Compact,
        Self::Gc,
        Self::UnreachableGarbage,
    ];

    /// Short tag embedded in pack names.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Receive => "receive",
            Self::Compact => "compact",
            Self::Gc => "gc",
            Self::UnreachableGarbage => "garbage",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.tag() == tag)
    }
}

impl fmt::Display for PackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The files that make up one pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PackExt {
    Pack,
    Index,
    Bitmap,
    /// Marker that protects the pack from being rebuilt or deleted.
    Keep,
}

impl PackExt {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pack => "pack",
            Self::Index => "idx",
            Self::Bitmap => "bitmap",
            Self::Keep => "keep",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pack" => Some(Self::Pack),
            "idx" => Some(Self::Index),
            "bitmap" => Some(Self::Bitmap),
            "keep" => Some(Self::Keep),
            _ => None,
        }
    }
}

/// Identity and metadata of one physical pack.
///
/// Pack names have the form `pack-<64 hex>-<source tag>`, where the hash
/// covers the source and the sorted ids of the pack's objects. Two packs
/// with the same content and source therefore share a name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackDescription {
    name: String,
    source: PackSource,
    file_sizes: BTreeMap<PackExt, u64>,
    object_count: u64,
    index_version: u32,
    statistics: Option<PackStatistics>,
}

impl PackDescription {
    pub fn new(name: impl Into<String>, source: PackSource) -> Self {
        Self {
            name: name.into(),
            source,
            file_sizes: BTreeMap::new(),
            object_count: 0,
            index_version: INDEX_VERSION,
            statistics: None,
        }
    }

    /// Parse a pack name, recovering its source.
    pub fn from_name(name: &str) -> PackResult<Self> {
        let invalid = || PackError::InvalidPackName(name.to_string());
        let rest = name.strip_prefix("pack-").ok_or_else(invalid)?;
        let (hash, tag) = rest.split_once('-').ok_or_else(invalid)?;
        if hash.len() != stow_types::OBJECT_ID_HEX_LEN
            || !hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(invalid());
        }
        let source = PackSource::from_tag(tag).ok_or_else(invalid)?;
        Ok(Self::new(name, source))
    }

    /// Split a file name into its pack name and extension.
    pub fn parse_file_name(file_name: &str) -> Option<(String, PackExt)> {
        let (name, ext) = file_name.rsplit_once('.')?;
        let ext = PackExt::from_extension(ext)?;
        Self::from_name(name).ok()?;
        Some((name.to_string(), ext))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> PackSource {
        self.source
    }

    pub fn file_name(&self, ext: PackExt) -> String {
        format!("{}.{}", self.name, ext.extension())
    }

    pub fn has_file(&self, ext: PackExt) -> bool {
        self.file_sizes.contains_key(&ext)
    }

    /// Size of one file, 0 if absent.
    pub fn file_size(&self, ext: PackExt) -> u64 {
        self.file_sizes.get(&ext).copied().unwrap_or(0)
    }

    pub fn set_file_size(&mut self, ext: PackExt, size: u64) {
        self.file_sizes.insert(ext, size);
    }

    pub fn clear_file(&mut self, ext: PackExt) {
        self.file_sizes.remove(&ext);
    }

    /// Extensions present for this pack.
    pub fn extensions(&self) -> impl Iterator<Item = PackExt> + '_ {
        self.file_sizes.keys().copied()
    }

    pub fn is_keep(&self) -> bool {
        self.has_file(PackExt::Keep)
    }

    pub fn object_count(&self) -> u64 {
        self.object_count
    }

    pub fn set_object_count(&mut self, count: u64) {
        self.object_count = count;
    }

    pub fn index_version(&self) -> u32 {
        self.index_version
    }

    pub fn set_index_version(&mut self, version: u32) {
        self.index_version = version;
    }

    pub fn statistics(&self) -> Option<&PackStatistics> {
        self.statistics.as_ref()
    }

    pub fn set_statistics(&mut self, stats: PackStatistics) {
        self.statistics = Some(stats);
    }
}

impl fmt::Display for PackDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
