//! Coherent compile cache.
//!
//! Keeps compiled artifacts in memory, keyed by artifact name, in front of
//! the artifact store. Writes and deletes invalidate the name before they are
//! acknowledged, so a read never observes a compiled artifact older than the
//! last acknowledged write.
//!
//! ```toml
//! [cache]
//! ttl_seconds = 300
//! sweep_interval_seconds = 600
//! ```

mod clock;
mod compile;
mod config;
mod error;
mod lock;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compile::{CompileCache, Compiler};
pub use config::CacheConfig;
pub use error::ResolveError;
pub use sweeper::spawn_sweeper;
