//! Shared fixtures for unit tests.

use crate::{
    FieldType,
    value::{DocValue, ObjectId},
};
use proptest::prelude::*;
use time::{Date, OffsetDateTime, Time};

const NANOS_PER_DAY: u64 = 86_400 * 1_000_000_000;

/// Arbitrary value of one scalar field type, `Null` included.
pub(crate) fn arb_scalar(field_type: FieldType) -> BoxedStrategy<DocValue> {
    match field_type {
        FieldType::Binary => prop::collection::vec(any::<u8>(), 0..16)
            .prop_map(DocValue::Binary)
            .boxed(),
        FieldType::Boolean => any::<bool>().prop_map(DocValue::Boolean).boxed(),
        FieldType::Date => (Date::MIN.to_julian_day()..=Date::MAX.to_julian_day())
            .prop_filter_map("julian day", |day| Date::from_julian_day(day).ok())
            .prop_map(DocValue::Date)
            .boxed(),
        FieldType::Double => any::<f64>().prop_map(DocValue::double).boxed(),
        FieldType::Instant => (-10_000_000_000_i64..10_000_000_000, 0..1_000_000_000_i64)
            .prop_filter_map("instant", |(secs, nanos)| {
                let total = i128::from(secs) * 1_000_000_000 + i128::from(nanos);
                OffsetDateTime::from_unix_timestamp_nanos(total).ok()
            })
            .prop_map(DocValue::instant)
            .boxed(),
        FieldType::Integer => any::<i32>().prop_map(DocValue::Integer).boxed(),
        FieldType::Long => any::<i64>().prop_map(DocValue::Long).boxed(),
        FieldType::Null => Just(DocValue::Null).boxed(),
        FieldType::ObjectId => any::<[u8; 12]>()
            .prop_map(|bytes| DocValue::ObjectId(ObjectId::from_bytes(bytes)))
            .boxed(),
        FieldType::String => ".{0,12}".prop_map(DocValue::String).boxed(),
        FieldType::Time => (0..NANOS_PER_DAY)
            .prop_filter_map("time", |nanos| {
                let secs = nanos / 1_000_000_000;
                Time::from_hms_nano(
                    u8::try_from(secs / 3600).ok()?,
                    u8::try_from(secs / 60 % 60).ok()?,
                    u8::try_from(secs % 60).ok()?,
                    u32::try_from(nanos % 1_000_000_000).ok()?,
                )
                .ok()
            })
            .prop_map(DocValue::Time)
            .boxed(),
        FieldType::Document | FieldType::Array => {
            panic!("{field_type} is not a scalar field type")
        }
    }
}

/// Arbitrary scalar field type other than `Null`.
pub(crate) fn arb_value_type() -> impl Strategy<Value = FieldType> {
    prop::sample::select(
        crate::ALL_FIELD_TYPES
            .iter()
            .copied()
            .filter(|ft| ft.is_scalar() && *ft != FieldType::Null)
            .collect::<Vec<_>>(),
    )
}
