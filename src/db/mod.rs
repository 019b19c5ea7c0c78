//! Local SQLite store.
//!
//! - `model`: row decoders from SQLite rows into the domain structs.
//! - `repo`: SQL-only functions over a [`Pool`].
//!
//! The repository traits are implemented on top of this module by
//! `crate::backend::sqlite`.

pub mod model;
pub mod repo;

pub use repo::*;
