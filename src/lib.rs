//! Named template store.
//!
//! Template sources live in an object store under caller-chosen names. Reads
//! go through a compile cache that never serves an artifact older than the
//! last acknowledged write for its name.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod store;
pub mod template;
