use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// TableRefStep
///
/// `Element` marks one array nesting level.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum TableRefStep {
    Field(String),
    Element,
}

impl TableRefStep {
    /// Rendered form used in paths and derived identifiers.
    pub const ELEMENT_MARK: &'static str = "$e";

    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    #[must_use]
    pub const fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name.as_str()),
            Self::Element => None,
        }
    }
}

///
/// TableRef
///
/// Pure path from a collection root to a nested object or array.
/// Never embeds a physical identifier. The empty path is the root.
///
/// Parents always sort before their descendants, so iterating a sorted set
/// of table refs visits every doc part after its owner.
///

#[derive(
    Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct TableRef {
    steps: Vec<TableRefStep>,
}

impl TableRef {
    #[must_use]
    pub const fn root() -> Self {
        Self { steps: Vec::new() }
    }

    #[must_use]
    pub const fn from_steps(steps: Vec<TableRefStep>) -> Self {
        Self { steps }
    }

    /// Root-relative path of plain field names.
    #[must_use]
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: fields.into_iter().map(TableRefStep::field).collect(),
        }
    }

    #[must_use]
    pub fn child(&self, step: TableRefStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);

        Self { steps }
    }

    #[must_use]
    pub fn field(&self, name: impl Into<String>) -> Self {
        self.child(TableRefStep::field(name))
    }

    #[must_use]
    pub fn element(&self) -> Self {
        self.child(TableRefStep::Element)
    }

    /// Owning path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.steps.split_last()?;

        Some(Self {
            steps: head.to_vec(),
        })
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn steps(&self) -> &[TableRefStep] {
        &self.steps
    }

    #[must_use]
    pub fn last(&self) -> Option<&TableRefStep> {
        self.steps.last()
    }

    /// True when `self` lies strictly below `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        self.steps.len() > other.steps.len() && self.steps.starts_with(&other.steps)
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for step in &self.steps {
            match step {
                TableRefStep::Field(name) => write!(f, ".{name}")?,
                TableRefStep::Element => write!(f, ".{}", TableRefStep::ELEMENT_MARK)?,
            }
        }

        Ok(())
    }
}
