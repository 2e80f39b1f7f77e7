//! ID List
//!
//! A sorted, uniqued sequence of 32-bit identifiers used as an existence
//! cache: O(log n) membership checks, O(n) maintenance. Backing storage
//! grows geometrically and is never shrunk before drop, trading memory for
//! stable behavior under the add/remove churn of session-count fluctuation.

use super::array;

/// What a list holds, sizing its initial capacity.
///
/// The hints reflect typical populations: many users, few groups, a handful
/// of pool slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdListKind {
    Users,
    Groups,
    PoolSlots,
}

impl IdListKind {
    fn initial_capacity(self) -> usize {
        match self {
            IdListKind::Users => 64,
            IdListKind::Groups => 16,
            IdListKind::PoolSlots => 8,
        }
    }
}

/// Sorted, duplicate-free set of 32-bit ids.
#[derive(Debug, Clone)]
pub struct IdList {
    ids: Vec<u32>,
}

impl IdList {
    /// Create an empty list sized by the kind's capacity hint.
    pub fn new(kind: IdListKind) -> Self {
        Self {
            ids: Vec::with_capacity(kind.initial_capacity()),
        }
    }

    /// Insert `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: u32) -> bool {
        if self.contains(id) {
            return false;
        }
        array::insert(&mut self.ids, id, u32::cmp);
        true
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: u32) -> bool {
        array::search(&self.ids, &id, u32::cmp).is_some()
    }

    /// Remove `id` if present. Returns whether anything was removed.
    pub fn remove(&mut self, id: u32) -> bool {
        array::remove(&mut self.ids, &id, u32::cmp).is_some()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Remove every id. Capacity is retained.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// The ids in ascending order.
    pub fn as_slice(&self) -> &[u32] {
        &self.ids
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_strictly_ascending(ids: &[u32]) -> bool {
        ids.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn test_insert_then_exists() {
        let mut list = IdList::new(IdListKind::Users);
        assert!(list.insert(42));
        assert!(list.contains(42));
        assert!(!list.contains(43));
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut list = IdList::new(IdListKind::Groups);
        assert!(list.insert(7));
        assert!(!list.insert(7));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_then_absent() {
        let mut list = IdList::new(IdListKind::Users);
        list.insert(1);
        list.insert(2);
        assert!(list.remove(1));
        assert!(!list.contains(1));
        assert!(!list.remove(1));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_clear_retains_nothing() {
        let mut list = IdList::new(IdListKind::PoolSlots);
        for id in 0..10 {
            list.insert(id);
        }
        list.clear();
        assert!(list.is_empty());
        assert!(!list.contains(0));
    }

    #[test]
    fn test_kind_capacity_hints() {
        assert!(IdList::new(IdListKind::Users).ids.capacity() >= 64);
        assert!(IdList::new(IdListKind::Groups).ids.capacity() >= 16);
        assert!(IdList::new(IdListKind::PoolSlots).ids.capacity() >= 8);
    }

    proptest! {
        // Full-scan sortedness check after every single operation.
        #[test]
        fn prop_sorted_and_unique_after_every_op(
            ops in proptest::collection::vec((any::<bool>(), 0u32..200), 0..128)
        ) {
            let mut list = IdList::new(IdListKind::Users);
            let mut model = std::collections::BTreeSet::new();
            for (is_insert, id) in ops {
                if is_insert {
                    prop_assert_eq!(list.insert(id), model.insert(id));
                } else {
                    prop_assert_eq!(list.remove(id), model.remove(&id));
                }
                prop_assert!(is_strictly_ascending(list.as_slice()));
                prop_assert_eq!(list.len(), model.len());
            }
            for id in 0..200 {
                prop_assert_eq!(list.contains(id), model.contains(&id));
            }
        }
    }
}
