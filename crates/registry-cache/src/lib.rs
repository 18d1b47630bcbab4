//! Persists a built [`registry_model::Model`] to disk so a server process
//! doesn't have to re-walk and re-validate a catalog on every restart.
//!
//! A cache directory is self-describing: it carries the digest of the
//! source bytes it was built from, so [`Cache::ensure`] can tell at a glance
//! whether it's still current. Two on-disk formats are supported and are
//! fully interchangeable from the caller's perspective -- they only differ
//! in physical layout, never in the `Model` they produce.

mod backend;
mod cache;
mod digest;
mod error;
mod format;
mod json;
mod kv;
mod migrations;
mod records;

pub use cache::Cache;
pub use error::CacheError;
pub use format::CacheFormat;

pub use digest::compute as compute_digest;
