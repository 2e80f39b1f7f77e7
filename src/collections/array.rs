//! Array Utility
//!
//! Generic sorted-array operations parameterized by a three-way comparator.
//! Foundation for [`IdList`](super::IdList) and [`NameList`](super::NameList).
//!
//! All operations require the buffer to already be ordered per the supplied
//! comparator (except [`sort`], which establishes that order). Behavior with
//! duplicate keys is unspecified unless the comparator totally orders
//! elements by a unique key. Element handles (`Box<T>`, `Arc<T>`) work the
//! same as inline values; the comparator sees the element either way.

use std::cmp::Ordering;

/// Binary-search for an element equal to `probe` under `cmp`.
///
/// Returns the index of a match, or `None`. An empty buffer always reports
/// not-found.
pub fn search<T, F>(buf: &[T], probe: &T, cmp: F) -> Option<usize>
where
    F: Fn(&T, &T) -> Ordering,
{
    buf.binary_search_by(|e| cmp(e, probe)).ok()
}

/// Binary-search with a probe function instead of a probe element.
///
/// `probe` reports how an element compares against the sought key; this
/// avoids materializing a full element just to look one up by key.
pub fn search_by<T, F>(buf: &[T], probe: F) -> Option<usize>
where
    F: Fn(&T) -> Ordering,
{
    buf.binary_search_by(|e| probe(e)).ok()
}

/// Insert `element` keeping `buf` ordered under `cmp`.
///
/// The insertion point is located by binary search; trailing elements shift
/// right. Returns the index the element landed at. `Vec` growth covers the
/// capacity guarantee the caller owes.
pub fn insert<T, F>(buf: &mut Vec<T>, element: T, cmp: F) -> usize
where
    F: Fn(&T, &T) -> Ordering,
{
    let at = match buf.binary_search_by(|e| cmp(e, &element)) {
        Ok(i) | Err(i) => i,
    };
    buf.insert(at, element);
    at
}

/// Locate and remove an element equal to `probe`, shifting trailing elements
/// left. Returns the removed element, or `None` if nothing matched.
pub fn remove<T, F>(buf: &mut Vec<T>, probe: &T, cmp: F) -> Option<T>
where
    F: Fn(&T, &T) -> Ordering,
{
    search(buf, probe, cmp).map(|i| buf.remove(i))
}

/// Order `buf` in place under `cmp`.
///
/// Unstable: equal elements' relative order is not preserved.
pub fn sort<T, F>(buf: &mut [T], cmp: F)
where
    F: Fn(&T, &T) -> Ordering,
{
    buf.sort_unstable_by(cmp);
}

// =============================================================================
// Tests
// =============================================================================
