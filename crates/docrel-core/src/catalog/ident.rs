//! Physical identifier derivation.
//!
//! Identifiers are derived from names only, so the same sequence of
//! allocations against the same catalog always yields the same names.

use crate::{
    FieldType,
    catalog::{TableRef, TableRefStep},
};

/// Columns every doc-part or side-table carries; never handed out.
pub const RESERVED_COLUMNS: [&str; 5] = ["did", "rid", "pid", "seq", "v"];

/// Lower-case and replace anything outside `[a-z0-9_]` with `_`.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Doc-part style stem for `table_ref` under a collection prefix.
#[must_use]
pub fn table_stem(collection_prefix: &str, table_ref: &TableRef) -> String {
    let mut stem = collection_prefix.to_string();
    for step in table_ref.steps() {
        stem.push('_');
        match step {
            TableRefStep::Field(name) => stem.push_str(&sanitize(name)),
            TableRefStep::Element => stem.push_str(TableRefStep::ELEMENT_MARK),
        }
    }

    stem
}

/// Column stem for the value at `field_ref`: its last step.
#[must_use]
pub fn column_stem(field_ref: &TableRef) -> String {
    match field_ref.last() {
        Some(TableRefStep::Field(name)) => sanitize(name),
        Some(TableRefStep::Element) => TableRefStep::ELEMENT_MARK.to_string(),
        None => String::new(),
    }
}

/// `_x` tail where `x` is the FieldType suffix.
#[must_use]
pub fn type_tail(field_type: FieldType) -> String {
    format!("_{}", field_type.suffix())
}

///
/// IdentifierPolicy
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdentifierPolicy {
    pub max_length: usize,
}

impl IdentifierPolicy {
    #[must_use]
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// First free identifier for `stem` + `tail`, then with `_2`, `_3`, …
    /// appended. Only the stem is truncated, so the tail always survives.
    #[must_use]
    pub fn derive(&self, stem: &str, tail: &str, is_taken: impl Fn(&str) -> bool) -> String {
        let base = self.fit(stem, tail);
        if !is_taken(&base) {
            return base;
        }

        let mut n: u64 = 2;
        loop {
            let candidate = self.fit(stem, &format!("{tail}_{n}"));
            if !is_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn fit(&self, stem: &str, tail: &str) -> String {
        let room = self.max_length.saturating_sub(tail.len());
        let mut end = stem.len().min(room);
        while !stem.is_char_boundary(end) {
            end -= 1;
        }

        format!("{}{tail}", &stem[..end])
    }
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self::new(docrel_config::DEFAULT_MAX_IDENTIFIER_LENGTH)
    }
}
