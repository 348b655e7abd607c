//! Field-map codec for single bookmark records.
//!
//! # Responsibility
//! - Convert `Bookmark` values to and from the flat field-map stored on disk
//!   and sent through the replica.
//!
//! # Invariants
//! - Encoding emits either `{name, centreRa, centreDec}` or
//!   `{name, solutionDictionary}`, never both.
//! - Decoding resolves to exactly one variant or fails.
//! - Unknown extra fields are ignored on decode.

use crate::model::bookmark::{Bookmark, BookmarkTarget, Coordinate};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const NAME_FIELD: &str = "name";
pub const CENTRE_RA_FIELD: &str = "centreRa";
pub const CENTRE_DEC_FIELD: &str = "centreDec";
pub const SOLUTION_FIELD: &str = "solutionDictionary";

const KNOWN_FIELDS: [&str; 4] = [NAME_FIELD, CENTRE_RA_FIELD, CENTRE_DEC_FIELD, SOLUTION_FIELD];

/// One primitive value inside a field-map.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Real(f64),
    Bytes(Vec<u8>),
}

/// Flat record representation used for persistence and transfer.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Record-level decode failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `name` is absent or empty.
    MissingName,
    /// Neither or both of the coordinate and solution forms are present.
    AmbiguousOrEmptyVariant,
    /// A field is present but has the wrong shape, or its partner is absent.
    InvalidField(String),
    /// The stored element is not a field-map at all.
    NotAFieldMap,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "record has no name"),
            Self::AmbiguousOrEmptyVariant => write!(
                f,
                "record must carry exactly one of coordinate or solution fields"
            ),
            Self::InvalidField(field) => {
                write!(f, "field `{field}` is missing or has the wrong type")
            }
            Self::NotAFieldMap => write!(f, "record is not a field map"),
        }
    }
}

impl Error for DecodeError {}

/// Encodes one bookmark into its field-map form.
pub fn encode(bookmark: &Bookmark) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(
        NAME_FIELD.to_string(),
        FieldValue::Text(bookmark.name.clone()),
    );
    match &bookmark.target {
        BookmarkTarget::Coordinate(coordinate) => {
            fields.insert(
                CENTRE_RA_FIELD.to_string(),
                FieldValue::Real(coordinate.ra),
            );
            fields.insert(
                CENTRE_DEC_FIELD.to_string(),
                FieldValue::Real(coordinate.dec),
            );
        }
        BookmarkTarget::Solution(payload) => {
            fields.insert(
                SOLUTION_FIELD.to_string(),
                FieldValue::Bytes(payload.clone()),
            );
        }
    }
    fields
}

/// Decodes one field-map into a bookmark.
pub fn decode(fields: &FieldMap) -> Result<Bookmark, DecodeError> {
    let name = match fields.get(NAME_FIELD) {
        Some(FieldValue::Text(name)) if !name.is_empty() => name.clone(),
        Some(FieldValue::Text(_)) | None => return Err(DecodeError::MissingName),
        Some(_) => return Err(DecodeError::InvalidField(NAME_FIELD.to_string())),
    };

    let ra = fields.get(CENTRE_RA_FIELD);
    let dec = fields.get(CENTRE_DEC_FIELD);
    let solution = fields.get(SOLUTION_FIELD);
    let has_coordinate = ra.is_some() || dec.is_some();

    let target = match (has_coordinate, solution) {
        (true, Some(_)) | (false, None) => return Err(DecodeError::AmbiguousOrEmptyVariant),
        (true, None) => BookmarkTarget::Coordinate(Coordinate::new(
            real_field(CENTRE_RA_FIELD, ra)?,
            real_field(CENTRE_DEC_FIELD, dec)?,
        )),
        (false, Some(FieldValue::Bytes(payload))) => BookmarkTarget::Solution(payload.clone()),
        (false, Some(_)) => return Err(DecodeError::InvalidField(SOLUTION_FIELD.to_string())),
    };

    Ok(Bookmark { name, target })
}

fn real_field(field: &str, value: Option<&FieldValue>) -> Result<f64, DecodeError> {
    match value {
        Some(FieldValue::Real(value)) => Ok(*value),
        _ => Err(DecodeError::InvalidField(field.to_string())),
    }
}

/// Converts a field-map into its JSON wire object.
pub(crate) fn field_map_to_json(fields: &FieldMap) -> Value {
    let mut object = Map::with_capacity(fields.len());
    for (key, value) in fields {
        let json = match value {
            FieldValue::Text(text) => Value::String(text.clone()),
            // Non-finite reals have no JSON form; they come back as an invalid field.
            FieldValue::Real(real) => Number::from_f64(*real).map_or(Value::Null, Value::Number),
            FieldValue::Bytes(bytes) => {
                Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect())
            }
        };
        object.insert(key.clone(), json);
    }
    Value::Object(object)
}

/// Parses one JSON wire object into a field-map.
pub(crate) fn field_map_from_json(value: &Value) -> Result<FieldMap, DecodeError> {
    let object = value.as_object().ok_or(DecodeError::NotAFieldMap)?;
    let mut fields = FieldMap::new();
    for (key, value) in object {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let field = match value {
            Value::String(text) => FieldValue::Text(text.clone()),
            Value::Number(number) => FieldValue::Real(
                number
                    .as_f64()
                    .ok_or_else(|| DecodeError::InvalidField(key.clone()))?,
            ),
            Value::Array(items) => FieldValue::Bytes(
                items
                    .iter()
                    .map(|item| {
                        item.as_u64()
                            .and_then(|byte| u8::try_from(byte).ok())
                            .ok_or_else(|| DecodeError::InvalidField(key.clone()))
                    })
                    .collect::<Result<Vec<u8>, DecodeError>>()?,
            ),
            _ => return Err(DecodeError::InvalidField(key.clone())),
        };
        fields.insert(key.clone(), field);
    }
    Ok(fields)
}
