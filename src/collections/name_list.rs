//! Name List
//!
//! A sorted sequence of (id, name) entries keyed by name, used for
//! existence/removal lookups against bulk-enumerated server records. The
//! list is populated from a [`NameSource`] in one pass and sorted once,
//! O(n log n) total instead of O(n²) incremental inserts. Re-loading the
//! same source is idempotent: entries dedup by name.

use std::cmp::Ordering;

use super::array;

/// The surrounding server's enumeration interface: whatever can yield the
/// full (id, name) population in one call.
pub trait NameSource {
    fn entries(&self) -> Vec<(u32, String)>;
}

impl<const N: usize> NameSource for [(u32, &str); N] {
    fn entries(&self) -> Vec<(u32, String)> {
        self.iter().map(|(id, n)| (*id, (*n).to_string())).collect()
    }
}

/// One (id, name) entry. The list owns the name; entries are destroyed
/// wholesale with the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub id: u32,
    pub name: String,
}

fn by_name(a: &NameEntry, b: &NameEntry) -> Ordering {
    a.name.cmp(&b.name)
}

/// Sorted-by-name cache of identifier/name pairs.
#[derive(Debug, Clone, Default)]
pub struct NameList {
    entries: Vec<NameEntry>,
}

impl NameList {
    /// Bulk-load from a source: collect, sort once, dedup by name.
    pub fn load(source: &dyn NameSource) -> Self {
        let mut entries: Vec<NameEntry> = source
            .entries()
            .into_iter()
            .map(|(id, name)| NameEntry { id, name })
            .collect();
        array::sort(&mut entries, by_name);
        entries.dedup_by(|a, b| a.name == b.name);
        Self { entries }
    }

    /// Whether a record with this name is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// The id paired with `name`, if cached.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.position(name).map(|i| self.entries[i].id)
    }

    /// Insert an entry. Returns `false` if the name is already present.
    pub fn insert(&mut self, id: u32, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        array::insert(&mut self.entries, NameEntry { id, name }, by_name);
        true
    }

    /// Remove the entry with this name. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order.
    pub fn as_slice(&self) -> &[NameEntry] {
        &self.entries
    }

    fn position(&self, name: &str) -> Option<usize> {
        array::search_by(&self.entries, |e| e.name.as_str().cmp(name))
    }
}

// =============================================================================
// Tests
// =============================================================================
