use serde::{Deserialize, Serialize};

use crate::index::INDEX_VERSION;

/// Settings for the pack writer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// zstd level applied to newly compressed entries.
    pub compression_level: i32,
    /// Emit a bitmap index for packs written from a complete closure.
    pub build_bitmaps: bool,
    /// Copy entries from existing packs verbatim instead of recompressing.
    pub reuse_objects: bool,
    /// Pack index format version to write.
    pub index_version: u32,
    /// Maximum number of commits that receive a bitmap.
    pub bitmap_commit_limit: usize,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
            build_bitmaps: true,
            reuse_objects: true,
            index_version: INDEX_VERSION,
            bitmap_commit_limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PackConfig::default();
        assert_eq!(config.compression_level, 3);
        assert!(config.build_bitmaps);
        assert!(config.reuse_objects);
        assert_eq!(config.index_version, INDEX_VERSION);
    }
}
