use crate::{
    FieldType,
    convert::{ConversionError, SqlLiteral, ValueConverter},
    value::DocValue,
};
use serde_json::Value as JsonValue;

///
/// ArrayConverter
///
/// Encodes a homogeneous run of scalar array elements as a single JSON
/// array literal. `None` marks a null element inside the run; every other
/// element must match the element converter's field type.
///

#[derive(Clone, Copy)]
pub struct ArrayConverter<'a> {
    element: &'a dyn ValueConverter,
}

impl<'a> ArrayConverter<'a> {
    pub(crate) const fn new(element: &'a dyn ValueConverter) -> Self {
        Self { element }
    }

    #[must_use]
    pub fn element_type(&self) -> FieldType {
        self.element.field_type()
    }

    pub fn encode(&self, elements: &[Option<DocValue>]) -> Result<SqlLiteral, ConversionError> {
        let items = elements
            .iter()
            .map(|element| match element {
                None => Ok(JsonValue::Null),
                Some(DocValue::Null) => Err(ConversionError::malformed(
                    self.element_type(),
                    "null array elements are encoded as absent slots",
                )),
                Some(value) => self.element.to_json(value),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let text = serde_json::to_string(&JsonValue::Array(items))
            .map_err(|err| ConversionError::malformed(self.element_type(), err.to_string()))?;

        Ok(SqlLiteral::Json(text))
    }

    pub fn decode(&self, literal: &SqlLiteral) -> Result<Vec<Option<DocValue>>, ConversionError> {
        let SqlLiteral::Json(text) = literal else {
            return Err(ConversionError::malformed(
                self.element_type(),
                format!("expected a json array literal, found {}", literal.kind()),
            ));
        };

        let json: JsonValue = serde_json::from_str(text)
            .map_err(|err| ConversionError::malformed(self.element_type(), err.to_string()))?;
        let JsonValue::Array(items) = json else {
            return Err(ConversionError::malformed(
                self.element_type(),
                "array literal is not a json array",
            ));
        };

        items
            .iter()
            .map(|item| match item {
                JsonValue::Null => Ok(None),
                item => self.element.from_json(item).map(Some),
            })
            .collect()
    }
}
