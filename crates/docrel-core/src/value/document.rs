use crate::value::DocValue;
use std::collections::BTreeSet;
use thiserror::Error as ThisError;

///
/// DocumentError
///
/// Shape violations rejected while building a [`Document`].
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DocumentError {
    #[error("document key at index {index} is empty")]
    EmptyKey { index: usize },

    #[error("document key '{key}' appears more than once")]
    DuplicateKey { key: String },
}

///
/// Document
///
/// Insertion-ordered object with unique, non-empty keys.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Document {
    entries: Vec<(String, DocValue)>,
}

impl Document {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a document, rejecting empty and duplicate keys.
    pub fn try_from_entries<K, I>(entries: I) -> Result<Self, DocumentError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DocValue)>,
    {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();

        for (index, (key, value)) in entries.into_iter().enumerate() {
            let key = key.into();
            if key.is_empty() {
                return Err(DocumentError::EmptyKey { index });
            }
            if !seen.insert(key.clone()) {
                return Err(DocumentError::DuplicateKey { key });
            }
            out.push((key, value));
        }

        Ok(Self { entries: out })
    }

    /// Append one entry; fails if the key is empty or already present.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<DocValue>,
    ) -> Result<(), DocumentError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DocumentError::EmptyKey {
                index: self.entries.len(),
            });
        }
        if self.get(&key).is_some() {
            return Err(DocumentError::DuplicateKey { key });
        }
        self.entries.push((key, value.into()));

        Ok(())
    }

    /// Builder-style [`Document::insert`].
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<DocValue>,
    ) -> Result<Self, DocumentError> {
        self.insert(key, value)?;

        Ok(self)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.entries
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
