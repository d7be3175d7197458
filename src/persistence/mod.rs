//! Persistence layer
//!
//! Durability is explicit: the repositories are written out as compressed
//! snapshots on request and read back on open. There is no write-ahead log.

pub mod snapshot;

pub use snapshot::{read_snapshot, write_snapshot, SNAPSHOT_ENTRY, SNAPSHOT_FORMAT_VERSION};
