//! Core reference types.
//!
//! A ref either points at an object directly or names another ref
//! (symbolic). Every update of a direct ref is recorded in that ref's reflog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stow_types::ObjectId;

/// Namespace of branch heads.
pub const HEADS_PREFIX: &str = "refs/heads/";
/// Namespace of tags.
pub const TAGS_PREFIX: &str = "refs/tags/";
/// Root of the ref namespace.
pub const REFS_PREFIX: &str = "refs/";
/// The symbolic ref naming the current branch.
pub const HEAD: &str = "HEAD";

/// Where a ref currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefStorage {
    /// Not yet persisted.
    New,
    /// Only in a loose ref file.
    Loose,
    /// Only in the packed-refs table.
    Packed,
    /// Loose file shadowing a packed entry.
    LoosePacked,
}

/// What a ref points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefTarget {
    /// An object id, with the peeled id when the object is an annotated tag.
    Object {
        id: ObjectId,
        peeled: Option<ObjectId>,
    },
    /// The name of another ref.
    Symbolic(String),
}

/// A named reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub name: String,
    pub target: RefTarget,
    pub storage: RefStorage,
}

impl Ref {
    /// A direct ref to `id`.
    pub fn object(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            target: RefTarget::Object { id, peeled: None },
            storage: RefStorage::New,
        }
    }

    /// A direct ref to an annotated tag `id` that peels to `peeled`.
    pub fn peeled(name: impl Into<String>, id: ObjectId, peeled: ObjectId) -> Self {
        Self {
            name: name.into(),
            target: RefTarget::Object {
                id,
                peeled: Some(peeled),
            },
            storage: RefStorage::New,
        }
    }

    /// A symbolic ref to `target`.
    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: RefTarget::Symbolic(target.into()),
            storage: RefStorage::New,
        }
    }

    pub fn with_storage(mut self, storage: RefStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.target, RefTarget::Symbolic(_))
    }

    /// Whether this ref is a branch head.
    pub fn is_head(&self) -> bool {
        self.name.starts_with(HEADS_PREFIX)
    }

    /// The object id of a direct ref. `None` for symbolic refs and for
    /// direct refs holding the null id.
    pub fn object_id(&self) -> Option<ObjectId> {
        match &self.target {
            RefTarget::Object { id, .. } if !id.is_null() => Some(*id),
            _ => None,
        }
    }

    pub fn peeled_id(&self) -> Option<ObjectId> {
        match &self.target {
            RefTarget::Object { peeled, .. } => *peeled,
            RefTarget::Symbolic(_) => None,
        }
    }

    /// Whether both refs point at the same thing, ignoring storage.
    pub fn same_target(&self, other: &Ref) -> bool {
        self.target == other.target
    }
}

/// Who made a change, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonIdent {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

impl PersonIdent {
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }
}

/// One recorded update of a ref.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflogEntry {
    pub old_id: ObjectId,
    pub new_id: ObjectId,
    pub who: PersonIdent,
    pub message: String,
}
