//! Persistence substrate for a multi-tenant academy-management application.
//!
//! The crate layers, bottom up:
//! - [`storage::engine`]: an adapter over an embedded ordered key-value
//!   engine, holding the single process-wide handle and enforcing the
//!   concurrent-reader budget.
//! - [`storage::keyspace`]: the key-space convention primary records and
//!   secondary index entries follow.
//! - [`repo`]: per-entity repositories with cascading index maintenance and
//!   migrate-on-read normalization of legacy record shapes.
//! - [`context`]: academy (tenant) resolution and the signed selection
//!   cookie.
//! - [`reset`]: the destructive wipe-and-reseed tool.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod repo;
pub mod reset;
pub mod storage;

pub use config::StoreConfig;
pub use context::{CookieSigner, Resolution, TenantContext, UserIdentity};
pub use error::{AcadError, AcadErrorCode};
pub use repo::Repos;
pub use storage::engine::{close, open, Kv, RedbStore};
