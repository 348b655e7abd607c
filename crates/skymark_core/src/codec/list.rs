//! Serialized bookmark list blobs.
//!
//! # Responsibility
//! - Serialize an ordered bookmark list as a JSON array of field-maps.
//! - Rebuild a list from a blob, skipping records that fail to decode.
//!
//! # Invariants
//! - The same blob shape is used by the local store and by replicas.
//! - A malformed record never aborts decoding of its siblings.

use super::record::{decode, encode, field_map_from_json, field_map_to_json, DecodeError};
use crate::model::bookmark::{Bookmark, BookmarkList};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Whole-blob failures; record failures are reported in `DecodedList`.
#[derive(Debug)]
pub enum ListCodecError {
    Json(serde_json::Error),
    NotAList,
}

impl Display for ListCodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "bookmark list is not valid JSON: {err}"),
            Self::NotAList => write!(f, "bookmark list blob is not an array"),
        }
    }
}

impl Error for ListCodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::NotAList => None,
        }
    }
}

impl From<serde_json::Error> for ListCodecError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Result of decoding a list blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedList {
    /// Successfully decoded bookmarks, in stored order.
    pub bookmarks: BookmarkList,
    /// Position in the stored array and reason for every skipped record.
    pub skipped: Vec<(usize, DecodeError)>,
}

pub fn encode_list(list: &BookmarkList) -> Result<Vec<u8>, ListCodecError> {
    let records = list
        .iter()
        .map(|bookmark| field_map_to_json(&encode(bookmark)))
        .collect::<Vec<_>>();
    Ok(serde_json::to_vec(&Value::Array(records))?)
}

pub fn decode_list(blob: &[u8]) -> Result<DecodedList, ListCodecError> {
    let value: Value = serde_json::from_slice(blob)?;
    let Value::Array(records) = value else {
        return Err(ListCodecError::NotAList);
    };

    let mut bookmarks: Vec<Bookmark> = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match field_map_from_json(record).and_then(|fields| decode(&fields)) {
            Ok(bookmark) => bookmarks.push(bookmark),
            Err(err) => skipped.push((index, err)),
        }
    }

    Ok(DecodedList {
        bookmarks: bookmarks.into(),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::{decode_list, encode_list, ListCodecError};
    use crate::codec::record::DecodeError;
    use crate::model::bookmark::{Bookmark, BookmarkList};

    #[test]
    fn list_blob_preserves_order_and_both_variants() {
        let list: BookmarkList = vec![
            Bookmark::coordinate("M31", 10.68, 41.27),
            Bookmark::solution("IC 1805", vec![0, 255, 7]),
            Bookmark::coordinate("M31", 10.68, 41.27),
        ]
        .into();

        let blob = encode_list(&list).unwrap();
        let decoded = decode_list(&blob).unwrap();
        assert_eq!(decoded.bookmarks, list);
        assert!(decoded.skipped.is_empty());
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let blob = br#"[
            {"name": "good", "centreRa": 1.5, "centreDec": -2.5},
            {"centreRa": 1.0, "centreDec": 2.0},
            "not a map",
            {"name": "both", "centreRa": 1.0, "centreDec": 2.0, "solutionDictionary": [1]},
            {"name": "payload", "solutionDictionary": [4, 2]}
        ]"#;

        let decoded = decode_list(blob).unwrap();
        let names = decoded
            .bookmarks
            .iter()
            .map(|bookmark| bookmark.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["good", "payload"]);
        assert_eq!(
            decoded.skipped,
            vec![
                (1, DecodeError::MissingName),
                (2, DecodeError::NotAFieldMap),
                (3, DecodeError::AmbiguousOrEmptyVariant),
            ]
        );
    }

    #[test]
    fn non_array_blob_is_rejected() {
        assert!(matches!(
            decode_list(br#"{"name": "x"}"#),
            Err(ListCodecError::NotAList)
        ));
        assert!(matches!(decode_list(b"\x00garbage"), Err(ListCodecError::Json(_))));
    }

    #[test]
    fn empty_list_encodes_as_empty_array() {
        let blob = encode_list(&BookmarkList::new()).unwrap();
        assert_eq!(blob, b"[]");
    }
}
