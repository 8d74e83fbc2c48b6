#[macro_export]
macro_rules! field_type_registry_entries {
    ($macro:ident $(, @args $($args:tt)+ )?) => {
        $macro! {
            $(
                @args $($args)+;
            )?
            @entries
            (Binary, tag = 1, suffix = 'r', label = "binary", sql_type = "bytea", class = Scalar),
            (Boolean, tag = 2, suffix = 'b', label = "boolean", sql_type = "boolean", class = Scalar),
            (Date, tag = 3, suffix = 'c', label = "date", sql_type = "date", class = Scalar),
            (Double, tag = 4, suffix = 'd', label = "double", sql_type = "double precision", class = Scalar),
            (Instant, tag = 5, suffix = 't', label = "instant", sql_type = "timestamptz", class = Scalar),
            (Integer, tag = 6, suffix = 'i', label = "integer", sql_type = "integer", class = Scalar),
            (Long, tag = 7, suffix = 'l', label = "long", sql_type = "bigint", class = Scalar),
            (Null, tag = 8, suffix = 'n', label = "null", sql_type = "boolean", class = Scalar),
            (ObjectId, tag = 9, suffix = 'x', label = "object_id", sql_type = "bytea", class = Scalar),
            (String, tag = 10, suffix = 's', label = "string", sql_type = "varchar", class = Scalar),
            (Time, tag = 11, suffix = 'm', label = "time", sql_type = "time", class = Scalar),
            (Document, tag = 12, suffix = 'e', label = "document", sql_type = "boolean", class = Container),
            (Array, tag = 13, suffix = 'a', label = "array", sql_type = "integer", class = Container),
        }
    };
}

#[macro_export]
macro_rules! field_type_registry {
    ($macro:ident) => {
        $crate::field_type_registry_entries!($macro)
    };
    ($macro:ident, $($args:tt)+) => {
        $crate::field_type_registry_entries!($macro, @args $($args)+)
    };
}

macro_rules! metadata_from_registry {
    ( @args $kind:expr; @entries $( ($variant:ident, tag = $tag:literal, suffix = $suffix:literal, label = $label:literal, sql_type = $sql_type:literal, class = $class:ident) ),* $(,)? ) => {
        match $kind {
            $(
                $crate::FieldType::$variant => $crate::FieldTypeMetadata {
                    tag: $tag,
                    suffix: $suffix,
                    label: $label,
                    sql_type: $sql_type,
                    class: $crate::FieldTypeClass::$class,
                },
            )*
        }
    };
}

macro_rules! from_tag_from_registry {
    ( @args $tag:expr; @entries $( ($variant:ident, tag = $t:literal, suffix = $suffix:literal, label = $label:literal, sql_type = $sql_type:literal, class = $class:ident) ),* $(,)? ) => {
        match $tag {
            $( $t => Some($crate::FieldType::$variant), )*
            _ => None,
        }
    };
}

macro_rules! from_suffix_from_registry {
    ( @args $suffix:expr; @entries $( ($variant:ident, tag = $tag:literal, suffix = $s:literal, label = $label:literal, sql_type = $sql_type:literal, class = $class:ident) ),* $(,)? ) => {
        match $suffix {
            $( $s => Some($crate::FieldType::$variant), )*
            _ => None,
        }
    };
}

macro_rules! all_types_from_registry {
    ( @entries $( ($variant:ident, tag = $tag:literal, suffix = $suffix:literal, label = $label:literal, sql_type = $sql_type:literal, class = $class:ident) ),* $(,)? ) => {
        [ $( $crate::FieldType::$variant ),* ]
    };
}
