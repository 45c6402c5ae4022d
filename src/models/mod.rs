//! Core data models for the sharded object store.
//!
//! Rows map to the SQLite tables via `sqlx::FromRow`; the placement and
//! resolution types travel over the metadata RPC as JSON via `serde`.

pub mod bucket;
pub mod chunk;
pub mod file;
