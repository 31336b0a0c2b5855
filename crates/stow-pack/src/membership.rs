use std::collections::HashSet;
use std::sync::Arc;

use stow_types::ObjectId;

/// Answers "does this set contain the object" without enumerating it.
///
/// Pack indexes implement this so that exclusion sets across sequential
/// writer passes can be composed without materializing id sets.
pub trait ObjectIdSet: Send + Sync {
    fn contains(&self, id: &ObjectId) -> bool;
}

impl ObjectIdSet for HashSet<ObjectId> {
    fn contains(&self, id: &ObjectId) -> bool {
        HashSet::contains(self, id)
    }
}

impl<T: ObjectIdSet + ?Sized> ObjectIdSet for Arc<T> {
    fn contains(&self, id: &ObjectId) -> bool {
        (**self).contains(id)
    }
}

/// Membership in any of several sets.
#[derive(Clone, Default)]
pub struct UnionSet {
    sets: Vec<Arc<dyn ObjectIdSet>>,
}

impl UnionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, set: Arc<dyn ObjectIdSet>) {
        self.sets.push(set);
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl ObjectIdSet for UnionSet {
    fn contains(&self, id: &ObjectId) -> bool {
        self.sets.iter().any(|s| s.contains(id))
    }
}

impl std::fmt::Debug for UnionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnionSet")
            .field("sets", &self.sets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_checks_every_member() {
        let a: HashSet<ObjectId> = [ObjectId::from_bytes(b"a")].into();
        let b: HashSet<ObjectId> = [ObjectId::from_bytes(b"b")].into();
        let mut union = UnionSet::new();
        assert!(!union.contains(&ObjectId::from_bytes(b"a")));
        union.push(Arc::new(a));
        union.push(Arc::new(b));
        assert_eq!(union.len(), 2);
        assert!(union.contains(&ObjectId::from_bytes(b"a")));
        assert!(union.contains(&ObjectId::from_bytes(b"b")));
        assert!(!union.contains(&ObjectId::from_bytes(b"c")));
    }
}
