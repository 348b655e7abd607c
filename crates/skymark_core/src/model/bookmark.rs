//! Bookmark domain model.
//!
//! # Responsibility
//! - Define the named sky position record shared by local and replicated lists.
//! - Keep the coordinate/solution choice a closed sum type.
//!
//! # Invariants
//! - A bookmark always resolves to exactly one `BookmarkTarget` variant.
//! - `name` must be non-empty for a bookmark to enter a list.
//! - List order is insertion order; duplicate names are allowed.
//!
//! # See also
//! - docs/architecture/bookmark-sync.md

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Equatorial position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub ra: f64,
    pub dec: f64,
}

impl Coordinate {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }
}

/// What a bookmark points at.
#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkTarget {
    /// Plain field centre.
    Coordinate(Coordinate),
    /// Serialized plate-solve solution, opaque to this crate.
    Solution(Vec<u8>),
}

/// Named, immutable sky bookmark.
#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub name: String,
    pub target: BookmarkTarget,
}

/// Validation errors raised before a bookmark is accepted into a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkValidationError {
    EmptyName,
    EmptyPayload,
    NonFiniteCoordinate,
}

impl Display for BookmarkValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "bookmark name must not be empty"),
            Self::EmptyPayload => write!(f, "solution payload must not be empty"),
            Self::NonFiniteCoordinate => write!(f, "coordinate values must be finite"),
        }
    }
}

impl Error for BookmarkValidationError {}

impl Bookmark {
    pub fn new(name: impl Into<String>, target: BookmarkTarget) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }

    pub fn coordinate(name: impl Into<String>, ra: f64, dec: f64) -> Self {
        Self::new(name, BookmarkTarget::Coordinate(Coordinate::new(ra, dec)))
    }

    pub fn solution(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(name, BookmarkTarget::Solution(payload.into()))
    }

    /// Checks the invariants required before a bookmark is appended.
    ///
    /// Names are not trimmed; a name of only whitespace is still a name.
    pub fn validate(&self) -> Result<(), BookmarkValidationError> {
        if self.name.is_empty() {
            return Err(BookmarkValidationError::EmptyName);
        }
        match &self.target {
            BookmarkTarget::Coordinate(coordinate) => {
                if !coordinate.ra.is_finite() || !coordinate.dec.is_finite() {
                    return Err(BookmarkValidationError::NonFiniteCoordinate);
                }
            }
            BookmarkTarget::Solution(payload) => {
                if payload.is_empty() {
                    return Err(BookmarkValidationError::EmptyPayload);
                }
            }
        }
        Ok(())
    }
}

/// Ordered bookmark list, the unit of storage and replication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkList(Vec<Bookmark>);

impl BookmarkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bookmark> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Bookmark] {
        &self.0
    }

    /// Returns a copy of this list with `bookmark` at the end.
    pub fn appended(&self, bookmark: Bookmark) -> Self {
        let mut items = Vec::with_capacity(self.0.len() + 1);
        items.extend(self.0.iter().cloned());
        items.push(bookmark);
        Self(items)
    }

    pub fn into_vec(self) -> Vec<Bookmark> {
        self.0
    }
}

impl From<Vec<Bookmark>> for BookmarkList {
    fn from(value: Vec<Bookmark>) -> Self {
        Self(value)
    }
}

impl FromIterator<Bookmark> for BookmarkList {
    fn from_iter<T: IntoIterator<Item = Bookmark>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a BookmarkList {
    type Item = &'a Bookmark;
    type IntoIter = std::slice::Iter<'a, Bookmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{Bookmark, BookmarkList, BookmarkValidationError};

    #[test]
    fn validate_rejects_empty_name() {
        let bookmark = Bookmark::coordinate("", 1.0, 2.0);
        assert_eq!(bookmark.validate(), Err(BookmarkValidationError::EmptyName));
    }

    #[test]
    fn validate_rejects_empty_payload_and_nan() {
        assert_eq!(
            Bookmark::solution("M42", Vec::new()).validate(),
            Err(BookmarkValidationError::EmptyPayload)
        );
        assert_eq!(
            Bookmark::coordinate("M42", f64::NAN, 0.0).validate(),
            Err(BookmarkValidationError::NonFiniteCoordinate)
        );
    }

    #[test]
    fn whitespace_name_is_still_a_name() {
        assert!(Bookmark::coordinate(" ", 0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn appended_preserves_order_and_source() {
        let base: BookmarkList = vec![Bookmark::coordinate("a", 1.0, 1.0)].into();
        let next = base.appended(Bookmark::coordinate("a", 2.0, 2.0));

        assert_eq!(base.len(), 1);
        assert_eq!(next.len(), 2);
        assert_eq!(next.as_slice()[0], base.as_slice()[0]);
        assert_eq!(next.as_slice()[1].name, "a");
    }
}
