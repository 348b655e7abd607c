//! Domain model for synchronized sky bookmarks.
//!
//! # Responsibility
//! - Define the bookmark value type and its ordered list container.
//!
//! # Invariants
//! - Bookmarks are immutable values; lists change only by whole-list replace.
//!
//! # See also
//! - docs/architecture/bookmark-sync.md

pub mod bookmark;
