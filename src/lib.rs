//! authstore - Database-Backed Cache-Consistency Engine
//!
//! A library that lets a multi-process FTP-style server treat a relational
//! backend as the authoritative, low-latency store for user/group records.
//! Worker tasks check connections out of a bounded pool, serve lookups
//! against sorted in-memory caches, and a timer-driven synchronization
//! engine watches the backend's global update marker to invalidate entries
//! another process changed.
//!
//! # Architecture
//!
//! ```text
//! workers ──► Pool (CondVar-gated contexts) ──► backend (prepared statements)
//!                    ▲                               ▲
//!                    │ acquire/release               │ marker + refresh queries
//!              SyncEngine (timer) ──► RefreshTarget caches (IdList/NameList)
//! ```
//!
//! # Modules
//!
//! - [`backend`] - connector/connection ports, statement templates, error
//!   classification, in-memory adapter
//! - [`collections`] - sorted array utility, ID list, name list
//! - [`config`] - host-resolved pool and sync tunables
//! - [`error`] - error taxonomy
//! - [`pool`] - bounded connection pool and its condition variable
//! - [`sync`] - marker-driven invalidation engine
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use authstore::backend::memory::{MemoryConnector, RecordStore};
//! use authstore::config::{PoolConfig, SyncConfig};
//! use authstore::pool::Pool;
//! use authstore::sync::SyncEngine;
//!
//! # async fn run() -> authstore::Result<()> {
//! let store = RecordStore::new();
//! let pool = Pool::init(
//!     PoolConfig::default(),
//!     Arc::new(MemoryConnector::new(store)),
//! )
//! .await?;
//!
//! let engine = Arc::new(SyncEngine::new(pool.clone(), SyncConfig::default(), vec![]));
//! let timer = engine.spawn();
//!
//! let ctx = pool.acquire().await?;
//! // ... execute prepared statements ...
//! pool.release(ctx).await?;
//!
//! timer.shutdown().await;
//! pool.finalize(std::time::Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod collections;
pub mod config;
pub mod error;
pub mod pool;
pub mod sync;

// Re-export commonly used types
pub use collections::{IdList, IdListKind, NameList, NameSource};
pub use config::{ConfigSource, PoolConfig, SyncConfig};
pub use error::{Error, Result};
pub use pool::{ConnectionContext, Pool, PoolStats};
pub use sync::{RecordDomain, RefreshTarget, SyncEngine, SyncHandle, SyncReport};
