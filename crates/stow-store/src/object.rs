use serde::{Deserialize, Serialize};
use stow_types::{ContentHasher, ObjectId};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A snapshot: root tree, parents, author, message.
    Commit,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// Raw content (file contents, arbitrary data).
    Blob,
    /// Annotated tag pointing at another object.
    Tag,
}

impl ObjectKind {
    /// Type byte used by the loose and pack encodings.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parse a type byte.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }

    fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Commit => &ContentHasher::COMMIT,
            Self::Tree => &ContentHasher::TREE,
            Self::Blob => &ContentHasher::BLOB,
            Self::Tag => &ContentHasher::TAG,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Tree => write!(f, "tree"),
            Self::Blob => write!(f, "blob"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

/// A stored object: kind tag + serialized data + cached size.
///
/// `StoredObject` is the unit of storage. Stores never interpret the data;
/// only [`StoredObject::links`] decodes it, to follow references during
/// reachability walks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The serialized bytes of the object.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    /// Ids of the objects this object references.
    ///
    /// Commits reference their tree and parents, trees their entries (except
    /// gitlinks, which name commits in another repository), tags their
    /// target. Blobs reference nothing.
    pub fn links(&self) -> StoreResult<Vec<ObjectId>> {
        match self.kind {
            ObjectKind::Blob => Ok(Vec::new()),
            ObjectKind::Commit => {
                let commit = Commit::from_stored_object(self)?;
                let mut links = Vec::with_capacity(commit.parents.len() + 1);
                links.push(commit.tree);
                links.extend(commit.parents);
                Ok(links)
            }
            ObjectKind::Tree => {
                let tree = Tree::from_stored_object(self)?;
                Ok(tree
                    .entries
                    .into_iter()
                    .filter(|e| e.mode != EntryMode::Gitlink)
                    .map(|e| e.object_id)
                    .collect())
            }
            ObjectKind::Tag => Ok(vec![Tag::from_stored_object(self)?.object]),
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, expected: ObjectKind) -> StoreResult<T> {
        if self.kind != expected {
            return Err(StoreError::CorruptObject {
                id: self.compute_id(),
                reason: format!("expected {expected}, got {}", self.kind),
            });
        }
        serde_json::from_slice(&self.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

fn encode<T: Serialize>(kind: ObjectKind, value: &T) -> StoreResult<StoredObject> {
    let data = serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(StoredObject::new(kind, data))
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Blob {
            return Err(StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("expected blob, got {}", obj.kind),
            });
        }
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree / directory (0o040000).
    Directory,
    /// Commit in another repository (0o160000). Never followed.
    Gitlink,
}

impl EntryMode {
    /// Octal mode value (for display/serialization).
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
            Self::Gitlink => 0o160000,
        }
    }

    /// Parse from an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Directory),
            0o160000 => Some(Self::Gitlink),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File mode.
    pub mode: EntryMode,
    /// Entry name (filename or directory name).
    pub name: String,
    /// Content-addressed ID of the referenced object.
    pub object_id: ObjectId,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Directory listing object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Sorted entries in this directory.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries.
    ///
    /// Entries are sorted by name for deterministic hashing.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        encode(ObjectKind::Tree, self)
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.decode(ObjectKind::Tree)
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// A commit: root tree plus zero or more parent commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: String,
    pub message: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl Commit {
    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        encode(ObjectKind::Commit, self)
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.decode(ObjectKind::Commit)
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Annotated tag object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// The tagged object.
    pub object: ObjectId,
    /// Kind of the tagged object.
    pub target_kind: ObjectKind,
    pub name: String,
    pub tagger: String,
    pub message: String,
}

impl Tag {
    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        encode(ObjectKind::Tag, self)
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.decode(ObjectKind::Tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(tree: ObjectId, parents: Vec<ObjectId>) -> Commit {
        Commit {
            tree,
            parents,
            author: "A U Thor <author@example.com>".into(),
            message: "initial".into(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn blob_kind_mismatch() {
        let stored = StoredObject::new(ObjectKind::Tree, b"not a blob".to_vec());
        let err = Blob::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn tree_entries_sorted() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "zebra.txt", ObjectId::null()),
            TreeEntry::new(EntryMode::Regular, "alpha.txt", ObjectId::null()),
            TreeEntry::new(EntryMode::Directory, "middle", ObjectId::null()),
        ]);
        assert_eq!(tree.entries[0].name, "alpha.txt");
        assert_eq!(tree.entries[1].name, "middle");
        assert_eq!(tree.entries[2].name, "zebra.txt");
        assert!(tree.get("middle").is_some());
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn commit_links_tree_then_parents() {
        let tree = ObjectId::from_bytes(b"tree");
        let p1 = ObjectId::from_bytes(b"p1");
        let p2 = ObjectId::from_bytes(b"p2");
        let stored = commit(tree, vec![p1, p2]).to_stored_object().unwrap();
        assert_eq!(stored.links().unwrap(), vec![tree, p1, p2]);
    }

    #[test]
    fn tree_links_skip_gitlinks() {
        let file = ObjectId::from_bytes(b"file");
        let sub = ObjectId::from_bytes(b"submodule commit");
        let stored = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "file", file),
            TreeEntry::new(EntryMode::Gitlink, "vendor", sub),
        ])
        .to_stored_object()
        .unwrap();
        assert_eq!(stored.links().unwrap(), vec![file]);
    }

    #[test]
    fn tag_links_target() {
        let target = ObjectId::from_bytes(b"target");
        let tag = Tag {
            object: target,
            target_kind: ObjectKind::Commit,
            name: "v1.0".into(),
            tagger: "T Agger".into(),
            message: "release".into(),
        };
        let stored = tag.to_stored_object().unwrap();
        assert_eq!(stored.links().unwrap(), vec![target]);
        assert_eq!(Tag::from_stored_object(&stored).unwrap(), tag);
    }

    #[test]
    fn blob_has_no_links() {
        let stored = Blob::new(b"leaf".to_vec()).to_stored_object();
        assert!(stored.links().unwrap().is_empty());
    }

    #[test]
    fn corrupt_commit_fails_to_link() {
        let stored = StoredObject::new(ObjectKind::Commit, b"{not json".to_vec());
        assert!(matches!(stored.links(), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn different_kinds_produce_different_ids() {
        let data = b"same data".to_vec();
        let blob = StoredObject::new(ObjectKind::Blob, data.clone());
        let tree = StoredObject::new(ObjectKind::Tree, data);
        assert_ne!(blob.compute_id(), tree.compute_id());
    }

    #[test]
    fn type_bytes_are_distinct_and_parse_back() {
        for kind in [ObjectKind::Commit, ObjectKind::Tree, ObjectKind::Blob, ObjectKind::Tag] {
            assert_eq!(ObjectKind::from_type_byte(kind.type_byte()), Some(kind));
        }
        assert!(ObjectKind::from_type_byte(0).is_none());
        assert!(ObjectKind::from_type_byte(9).is_none());
    }

    #[test]
    fn entry_mode_bits() {
        assert_eq!(EntryMode::from_mode_bits(0o160000), Some(EntryMode::Gitlink));
        assert!(EntryMode::from_mode_bits(0o777).is_none());
        assert_eq!(EntryMode::Directory.to_string(), "040000");
    }
}
