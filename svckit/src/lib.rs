//! Shared kit for the care feeds.
//!
//! Holds everything the services share: configuration structs, the error
//! type, canonical record types with their row normalization, the backend
//! capability trait and its hosted/in-memory implementations, and the
//! Prometheus registry.

pub mod backend;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod types;
