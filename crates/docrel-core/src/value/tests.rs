use crate::{
    FieldType,
    value::{DocValue, Document, DocumentError, Double, ObjectId},
};
use time::{Date, Month, OffsetDateTime, Time, UtcOffset};

// ---- helpers -----------------------------------------------------------

fn sample_values() -> Vec<(DocValue, FieldType)> {
    vec![
        (DocValue::Binary(vec![1, 2, 3]), FieldType::Binary),
        (DocValue::Boolean(true), FieldType::Boolean),
        (
            DocValue::Date(Date::from_calendar_date(2024, Month::January, 2).expect("date")),
            FieldType::Date,
        ),
        (DocValue::double(2.5), FieldType::Double),
        (
            DocValue::instant(OffsetDateTime::UNIX_EPOCH),
            FieldType::Instant,
        ),
        (DocValue::Integer(7), FieldType::Integer),
        (DocValue::Long(1 << 40), FieldType::Long),
        (DocValue::Null, FieldType::Null),
        (
            DocValue::ObjectId(ObjectId::from_bytes([9; 12])),
            FieldType::ObjectId,
        ),
        (DocValue::string("x"), FieldType::String),
        (
            DocValue::Time(Time::from_hms(12, 30, 0).expect("time")),
            FieldType::Time,
        ),
        (DocValue::Document(Document::new()), FieldType::Document),
        (DocValue::Array(Vec::new()), FieldType::Array),
    ]
}

#[test]
fn every_value_maps_to_exactly_one_field_type() {
    let values = sample_values();
    assert_eq!(values.len(), crate::ALL_FIELD_TYPES.len());

    for (value, expected) in values {
        assert_eq!(value.field_type(), expected, "value {value:?}");
    }
}

#[test]
fn double_equality_is_bitwise() {
    assert_eq!(Double::new(f64::NAN), Double::new(f64::NAN));
    assert_ne!(Double::new(0.0), Double::new(-0.0));
    assert_eq!(Double::new(1.5), Double::new(1.5));
}

#[test]
fn instant_is_normalized_to_utc() {
    let offset = UtcOffset::from_hms(2, 0, 0).expect("offset");
    let local = OffsetDateTime::UNIX_EPOCH.to_offset(offset);

    let DocValue::Instant(stored) = DocValue::instant(local) else {
        panic!("instant constructor must build an instant");
    };
    assert_eq!(stored.offset(), UtcOffset::UTC);
    assert_eq!(stored, OffsetDateTime::UNIX_EPOCH);
}

#[test]
fn object_id_hex_round_trips() {
    let id = ObjectId::from_bytes([0xab; 12]);
    let hex = id.to_hex();
    assert_eq!(hex.len(), 24);
    assert_eq!(hex.parse::<ObjectId>().expect("hex should parse"), id);
    assert!("abcd".parse::<ObjectId>().is_err());
    assert!(ObjectId::try_from_slice(&[1, 2, 3]).is_none());
}

#[test]
fn document_preserves_insertion_order() {
    let doc = Document::new()
        .with("z", 1)
        .and_then(|d| d.with("a", "x"))
        .and_then(|d| d.with("m", true))
        .expect("document should build");

    let keys = doc.iter().map(|(k, _)| k).collect::<Vec<_>>();
    assert_eq!(keys, vec!["z", "a", "m"]);
    assert_eq!(doc.get("a"), Some(&DocValue::string("x")));
    assert_eq!(doc.get("missing"), None);
}

#[test]
fn document_rejects_duplicate_and_empty_keys() {
    let err = Document::try_from_entries([("a", DocValue::Null), ("a", DocValue::Boolean(true))])
        .expect_err("duplicate key must fail");
    assert_eq!(
        err,
        DocumentError::DuplicateKey {
            key: "a".to_string()
        }
    );

    let err = Document::try_from_entries([("", DocValue::Null)]).expect_err("empty key");
    assert_eq!(err, DocumentError::EmptyKey { index: 0 });

    let mut doc = Document::new();
    doc.insert("k", 1).expect("first insert");
    assert!(doc.insert("k", 2).is_err());
}

#[test]
fn vec_conversion_builds_arrays() {
    let value = DocValue::from(vec![1, 2, 3]);
    assert_eq!(
        value,
        DocValue::Array(vec![
            DocValue::Integer(1),
            DocValue::Integer(2),
            DocValue::Integer(3)
        ])
    );
    assert!(value.is_container());
    assert_eq!(value.as_array().map(<[DocValue]>::len), Some(3));
}
