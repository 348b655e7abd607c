//! Local persistence for bookmark lists.
//!
//! # Responsibility
//! - Define the keyed local store contract used by the synchronizer.
//! - Isolate SQLite details from sync orchestration.
//!
//! # Invariants
//! - Stores replace whole lists; there is no field-level update path.

pub mod local_store;
