#![forbid(unsafe_code)]

//! Persistent relational store for updates and assets.
//!
//! Two tables plus a join table (`updates`, `assets`, `updates_assets`) and a
//! `json_data` side table, backed by SQLite in WAL mode. Every multi-statement
//! operation runs in a single transaction and fails closed: on any error the
//! transaction rolls back and no partial state is observable.
//!
//! Assets are content-addressed; the store guarantees at most one row (and so
//! one on-disk file) per content hash, no matter how many updates reference
//! the same bytes.

mod error;
mod schema;
mod store;

pub use crate::{
    error::{StoreError, StoreResult},
    store::UpdateStore,
};
