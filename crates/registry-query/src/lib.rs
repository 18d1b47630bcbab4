//! Answers the catalog's read-only query operations against a single,
//! already-validated [`registry_model::Model`].
//!
//! The querier never touches disk: by the time one exists, a cache or the
//! Model Builder has already done that work. Its only job is to walk
//! the in-memory model and shape results, respecting cancellation as it goes.

mod error;
mod querier;
mod views;

pub use error::QueryError;
pub use querier::Querier;
pub use views::ChannelEntryView;
