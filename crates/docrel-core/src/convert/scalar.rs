use crate::{
    FieldType,
    convert::{ConversionError, SqlLiteral, ValueConverter},
    value::{DocValue, Double, ObjectId},
};
use serde_json::{Number, Value as JsonValue};
use time::{Date, OffsetDateTime, Time};

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SECOND;

const JSON_NAN: &str = "NaN";
const JSON_INFINITY: &str = "Infinity";
const JSON_NEG_INFINITY: &str = "-Infinity";

/// Built-in converter set, one per scalar field type.
pub(super) fn standard_converters() -> Vec<Box<dyn ValueConverter>> {
    vec![
        Box::new(BinaryConverter),
        Box::new(BooleanConverter),
        Box::new(DateConverter),
        Box::new(DoubleConverter),
        Box::new(InstantConverter),
        Box::new(IntegerConverter),
        Box::new(LongConverter),
        Box::new(NullConverter),
        Box::new(ObjectIdConverter),
        Box::new(StringConverter),
        Box::new(TimeConverter),
    ]
}

fn json_str(field_type: FieldType, json: &JsonValue) -> Result<&str, ConversionError> {
    json.as_str()
        .ok_or_else(|| ConversionError::unexpected_json(field_type, json))
}

fn json_i64(field_type: FieldType, json: &JsonValue) -> Result<i64, ConversionError> {
    json.as_i64()
        .ok_or_else(|| ConversionError::unexpected_json(field_type, json))
}

fn decode_hex(field_type: FieldType, text: &str) -> Result<Vec<u8>, ConversionError> {
    hex::decode(text).map_err(|err| ConversionError::malformed(field_type, err.to_string()))
}

///
/// BinaryConverter
///

struct BinaryConverter;

impl ValueConverter for BinaryConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Binary
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Binary(bytes) => Ok(SqlLiteral::Bytea(bytes.clone())),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Bytea(bytes) => Ok(DocValue::Binary(bytes.clone())),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::Binary(bytes) => Ok(JsonValue::String(hex::encode(bytes))),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        let text = json_str(self.field_type(), json)?;

        Ok(DocValue::Binary(decode_hex(self.field_type(), text)?))
    }
}

///
/// BooleanConverter
///

struct BooleanConverter;

impl ValueConverter for BooleanConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Boolean
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Boolean(v) => Ok(SqlLiteral::Boolean(*v)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Boolean(v) => Ok(DocValue::Boolean(*v)),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::Boolean(v) => Ok(JsonValue::Bool(*v)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        json.as_bool()
            .map(DocValue::Boolean)
            .ok_or_else(|| ConversionError::unexpected_json(self.field_type(), json))
    }
}

///
/// DateConverter
///
/// Array elements travel as Julian day numbers.
///

struct DateConverter;

impl ValueConverter for DateConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Date
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Date(date) => Ok(SqlLiteral::Date(*date)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Date(date) => Ok(DocValue::Date(*date)),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::Date(date) => Ok(JsonValue::from(date.to_julian_day())),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        let day = json_i64(self.field_type(), json)?;
        let day = i32::try_from(day).map_err(|_| {
            ConversionError::malformed(self.field_type(), format!("julian day {day} out of range"))
        })?;
        let date = Date::from_julian_day(day)
            .map_err(|err| ConversionError::malformed(self.field_type(), err.to_string()))?;

        Ok(DocValue::Date(date))
    }
}

///
/// DoubleConverter
///
/// Non-finite doubles have no JSON number form and travel as the strings
/// `NaN`, `Infinity`, and `-Infinity`.
///

struct DoubleConverter;

impl ValueConverter for DoubleConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Double
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Double(v) => Ok(SqlLiteral::Double(*v)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Double(v) => Ok(DocValue::Double(*v)),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        let DocValue::Double(v) = value else {
            return Err(ConversionError::mismatch(self.field_type(), value));
        };
        let v = v.get();

        let json = match Number::from_f64(v) {
            Some(number) => JsonValue::Number(number),
            None if v.is_nan() => JsonValue::from(JSON_NAN),
            None if v.is_sign_positive() => JsonValue::from(JSON_INFINITY),
            None => JsonValue::from(JSON_NEG_INFINITY),
        };

        Ok(json)
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        let v = match json {
            JsonValue::Number(number) => number
                .as_f64()
                .ok_or_else(|| ConversionError::unexpected_json(self.field_type(), json))?,
            JsonValue::String(text) => match text.as_str() {
                JSON_NAN => f64::NAN,
                JSON_INFINITY => f64::INFINITY,
                JSON_NEG_INFINITY => f64::NEG_INFINITY,
                _ => return Err(ConversionError::unexpected_json(self.field_type(), json)),
            },
            _ => return Err(ConversionError::unexpected_json(self.field_type(), json)),
        };

        Ok(DocValue::Double(Double::new(v)))
    }
}

///
/// InstantConverter
///
/// Array elements travel as decimal strings of Unix nanoseconds; an `i128`
/// does not fit a JSON number losslessly.
///

struct InstantConverter;

impl ValueConverter for InstantConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Instant
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Instant(at) => Ok(SqlLiteral::Timestamptz(*at)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Timestamptz(at) => Ok(DocValue::instant(*at)),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::Instant(at) => Ok(JsonValue::String(at.unix_timestamp_nanos().to_string())),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        let text = json_str(self.field_type(), json)?;
        let nanos = text.parse::<i128>().map_err(|err| {
            ConversionError::malformed(self.field_type(), format!("'{text}': {err}"))
        })?;
        let at = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|err| ConversionError::malformed(self.field_type(), err.to_string()))?;

        Ok(DocValue::instant(at))
    }
}

///
/// IntegerConverter
///

struct IntegerConverter;

impl ValueConverter for IntegerConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Integer
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Integer(v) => Ok(SqlLiteral::Integer(*v)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Integer(v) => Ok(DocValue::Integer(*v)),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::Integer(v) => Ok(JsonValue::from(*v)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        let v = json_i64(self.field_type(), json)?;
        let v = i32::try_from(v).map_err(|_| {
            ConversionError::malformed(self.field_type(), format!("{v} does not fit 32 bits"))
        })?;

        Ok(DocValue::Integer(v))
    }
}

///
/// LongConverter
///

struct LongConverter;

impl ValueConverter for LongConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Long
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Long(v) => Ok(SqlLiteral::Bigint(*v)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Bigint(v) => Ok(DocValue::Long(*v)),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::Long(v) => Ok(JsonValue::from(*v)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        Ok(DocValue::Long(json_i64(self.field_type(), json)?))
    }
}

///
/// NullConverter
///
/// A null-typed column is a presence flag: `TRUE` marks an explicit null.
///

struct NullConverter;

impl ValueConverter for NullConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Null
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        self.check_type(value)?;

        Ok(SqlLiteral::Boolean(true))
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Boolean(true) => Ok(DocValue::Null),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        self.check_type(value)?;

        Ok(JsonValue::Null)
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        match json {
            JsonValue::Null => Ok(DocValue::Null),
            other => Err(ConversionError::unexpected_json(self.field_type(), other)),
        }
    }
}

///
/// ObjectIdConverter
///

struct ObjectIdConverter;

impl ObjectIdConverter {
    fn from_bytes(bytes: &[u8]) -> Result<DocValue, ConversionError> {
        ObjectId::try_from_slice(bytes)
            .map(DocValue::ObjectId)
            .ok_or_else(|| {
                ConversionError::malformed(
                    FieldType::ObjectId,
                    format!("expected 12 bytes, found {}", bytes.len()),
                )
            })
    }
}

impl ValueConverter for ObjectIdConverter {
    fn field_type(&self) -> FieldType {
        FieldType::ObjectId
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::ObjectId(id) => Ok(SqlLiteral::Bytea(id.as_bytes().to_vec())),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Bytea(bytes) => Self::from_bytes(bytes),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::ObjectId(id) => Ok(JsonValue::String(id.to_hex())),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        let text = json_str(self.field_type(), json)?;

        Self::from_bytes(&decode_hex(self.field_type(), text)?)
    }
}

///
/// StringConverter
///

struct StringConverter;

impl ValueConverter for StringConverter {
    fn field_type(&self) -> FieldType {
        FieldType::String
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::String(text) => Ok(SqlLiteral::Text(text.clone())),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Text(text) => Ok(DocValue::String(text.clone())),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        match value {
            DocValue::String(text) => Ok(JsonValue::String(text.clone())),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        Ok(DocValue::String(json_str(self.field_type(), json)?.to_string()))
    }
}

///
/// TimeConverter
///
/// Array elements travel as nanoseconds since midnight.
///

struct TimeConverter;

impl ValueConverter for TimeConverter {
    fn field_type(&self) -> FieldType {
        FieldType::Time
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        match value {
            DocValue::Time(t) => Ok(SqlLiteral::Time(*t)),
            other => Err(ConversionError::mismatch(self.field_type(), other)),
        }
    }

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError> {
        match literal {
            SqlLiteral::Time(t) => Ok(DocValue::Time(*t)),
            other => Err(ConversionError::unexpected_literal(self.field_type(), other)),
        }
    }

    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError> {
        let DocValue::Time(t) = value else {
            return Err(ConversionError::mismatch(self.field_type(), value));
        };
        let (h, m, s, ns) = t.as_hms_nano();
        let seconds = (u64::from(h) * 60 + u64::from(m)) * 60 + u64::from(s);

        Ok(JsonValue::from(seconds * NANOS_PER_SECOND + u64::from(ns)))
    }

    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError> {
        let nanos = json
            .as_u64()
            .filter(|nanos| *nanos < NANOS_PER_DAY)
            .ok_or_else(|| ConversionError::unexpected_json(self.field_type(), json))?;

        let seconds = nanos / NANOS_PER_SECOND;
        let component = |v: u64| {
            u8::try_from(v)
                .map_err(|_| ConversionError::malformed(self.field_type(), "component overflow"))
        };
        let ns = u32::try_from(nanos % NANOS_PER_SECOND)
            .map_err(|_| ConversionError::malformed(self.field_type(), "component overflow"))?;
        let t = Time::from_hms_nano(
            component(seconds / 3600)?,
            component(seconds / 60 % 60)?,
            component(seconds % 60)?,
            ns,
        )
        .map_err(|err| ConversionError::malformed(self.field_type(), err.to_string()))?;

        Ok(DocValue::Time(t))
    }
}
