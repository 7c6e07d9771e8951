//! Shared test fixtures for the Colophon workspace.
//!
//! Provides a single shared PostgreSQL testcontainer per test process,
//! an in-memory implementation of the store traits for driver-level
//! tests that do not need a database, and builders for OJS payloads
//! used with mock servers.

mod fixtures;
mod memory;
mod payloads;

pub use fixtures::*;
pub use memory::MemoryStore;
pub use payloads::*;
