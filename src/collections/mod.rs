//! Sorted Cache Collections
//!
//! The in-memory existence/identity caches the engine maintains over backend
//! records, all built on one generic sorted-array utility:
//!
//! - [`array`] - comparator-driven search/insert/remove/sort over a `Vec`
//! - [`IdList`] - sorted, uniqued 32-bit identifiers
//! - [`NameList`] - (id, name) entries sorted by name, bulk-loaded once
//!
//! None of these are internally synchronized; the owning component wraps them
//! in its own lock when shared across tasks.

pub mod array;
pub mod id_list;
pub mod name_list;

pub use id_list::{IdList, IdListKind};
pub use name_list::{NameList, NameSource};
