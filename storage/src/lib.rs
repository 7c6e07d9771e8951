//! # Storage Layer
//!
//! PostgreSQL persistence for the sync engine's domain records. All
//! access goes through the store traits in `ojs_core`, so the engine and
//! its tests never depend on this crate directly.

pub mod postgres;

pub use postgres::PgStore;
