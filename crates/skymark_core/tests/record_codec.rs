use skymark_core::{decode, encode, Bookmark, DecodeError, FieldMap};

#[test]
fn decode_inverts_encode_for_valid_bookmarks() {
    let samples = vec![
        Bookmark::coordinate("M31", 10.68, 41.27),
        Bookmark::coordinate("south pole", 0.0, -90.0),
        Bookmark::coordinate("wrap", 359.999_999, 0.000_001),
        Bookmark::solution("IC 1805", vec![0]),
        Bookmark::solution("payload", (0..=255).collect::<Vec<u8>>()),
        Bookmark::coordinate("Ωmega Cen", 201.69, -47.48),
    ];

    for bookmark in samples {
        assert!(bookmark.validate().is_ok());
        assert_eq!(decode(&encode(&bookmark)), Ok(bookmark));
    }
}

#[test]
fn empty_field_map_has_no_name() {
    assert_eq!(decode(&FieldMap::new()), Err(DecodeError::MissingName));
}
