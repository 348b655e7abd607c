//! Record codec between bookmarks and their stored field-map form.
//!
//! # Responsibility
//! - Map the `BookmarkTarget` sum type onto flat field-maps and back.
//! - Serialize whole lists for the local store and replica transfer.
//!
//! # Invariants
//! - Pure transformations; no I/O and no logging.
//!
//! # See also
//! - docs/architecture/bookmark-sync.md

pub mod list;
pub mod record;

pub use list::{decode_list, encode_list, DecodedList, ListCodecError};
pub use record::{decode, encode, DecodeError, FieldMap, FieldValue};
