use std::collections::{HashSet, VecDeque};

use stow_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectReader;

/// Breadth-first enumeration of reachable objects.
///
/// The walk yields every object reachable from the start points that is not
/// reachable from an uninteresting point. Each object is yielded at most
/// once. A start object (or anything it references) that cannot be read is
/// an error; missing objects below an uninteresting point are tolerated,
/// since that side only bounds the walk.
pub struct ObjectWalk<'a> {
    reader: &'a dyn ObjectReader,
    uninteresting: HashSet<ObjectId>,
    seen: HashSet<ObjectId>,
    pending: VecDeque<ObjectId>,
}

impl<'a> ObjectWalk<'a> {
    pub fn new(reader: &'a dyn ObjectReader) -> Self {
        Self {
            reader,
            uninteresting: HashSet::new(),
            seen: HashSet::new(),
            pending: VecDeque::new(),
        }
    }

    /// Exclude `id` and everything it reaches.
    pub fn mark_uninteresting(&mut self, id: ObjectId) -> StoreResult<()> {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if next.is_null() || !self.uninteresting.insert(next) {
                continue;
            }
            match self.reader.read(&next) {
                Ok(Some(obj)) => stack.extend(obj.links()?),
                Ok(None) => debug!(id = %next.short_hex(), "uninteresting object missing"),
                Err(StoreError::HashMismatch { .. } | StoreError::CorruptObject { .. }) => {
                    debug!(id = %next.short_hex(), "uninteresting object unreadable");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Add a start point. Null ids are ignored.
    pub fn mark_start(&mut self, id: ObjectId) {
        if !id.is_null() && self.seen.insert(id) {
            self.pending.push_back(id);
        }
    }

    /// Whether `id` lies in the uninteresting closure.
    pub fn is_uninteresting(&self, id: &ObjectId) -> bool {
        self.uninteresting.contains(id)
    }

    /// The next reachable object, or `None` when the walk is exhausted.
    pub fn next_object(&mut self) -> StoreResult<Option<(ObjectId, StoredObject)>> {
        while let Some(id) = self.pending.pop_front() {
            if self.uninteresting.contains(&id) {
                continue;
            }
            let obj = self.reader.read(&id)?.ok_or(StoreError::NotFound(id))?;
            for link in obj.links()? {
                if !link.is_null() && self.seen.insert(link) {
                    self.pending.push_back(link);
                }
            }
            return Ok(Some((id, obj)));
        }
        Ok(None)
    }

    /// Drain the walk, collecting every reachable id.
    pub fn collect_ids(mut self) -> StoreResult<HashSet<ObjectId>> {
        let mut ids = HashSet::new();
        while let Some((id, _)) = self.next_object()? {
            ids.insert(id);
        }
        Ok(ids)
    }
}
