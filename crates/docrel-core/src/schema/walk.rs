//! Document decomposition into doc-part rows and scalar runs.
//!
//! The walk is deterministic given the base snapshot and the documents seen
//! earlier by the same walker, so planning and statement rendering agree on
//! every FieldType decision.

use crate::{
    FieldType,
    catalog::{CatalogSnapshot, TableRef},
    value::{DocValue, Document},
};
use std::collections::{BTreeMap, BTreeSet};

///
/// Cell
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Cell<'d> {
    /// Scalar value, or a null typed by the walk.
    Value(&'d DocValue),
    /// Nested document present.
    Present,
    /// Array element count.
    Count(usize),
}

///
/// WalkCell
///

#[derive(Clone, Debug)]
pub(crate) struct WalkCell<'d> {
    pub(crate) field_ref: TableRef,
    pub(crate) field_type: FieldType,
    pub(crate) value: Cell<'d>,
}

///
/// WalkRow
///
/// One row of the doc part at `table_ref`. `owner` indexes the row this one
/// hangs off; `seq` is the array position for array elements.
///

#[derive(Clone, Debug)]
pub(crate) struct WalkRow<'d> {
    pub(crate) table_ref: TableRef,
    pub(crate) owner: Option<usize>,
    pub(crate) seq: Option<usize>,
    pub(crate) cells: Vec<WalkCell<'d>>,
}

///
/// WalkRun
///
/// Maximal run of same-typed scalar elements of the array at `array_ref`,
/// starting at position `start`. `None` marks a null element.
///

#[derive(Clone, Debug)]
pub(crate) struct WalkRun<'d> {
    pub(crate) array_ref: TableRef,
    pub(crate) field_type: FieldType,
    pub(crate) owner: usize,
    pub(crate) start: usize,
    pub(crate) elements: Vec<Option<&'d DocValue>>,
}

///
/// WalkedDoc
/// Row 0 is always the root row.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct WalkedDoc<'d> {
    pub(crate) rows: Vec<WalkRow<'d>>,
    pub(crate) runs: Vec<WalkRun<'d>>,
}

impl<'d> WalkedDoc<'d> {
    fn push_row(&mut self, table_ref: TableRef, owner: Option<usize>, seq: Option<usize>) -> usize {
        self.rows.push(WalkRow {
            table_ref,
            owner,
            seq,
            cells: Vec::new(),
        });

        self.rows.len() - 1
    }

    fn push_cell(
        &mut self,
        row: usize,
        field_ref: TableRef,
        field_type: FieldType,
        value: Cell<'d>,
    ) {
        self.rows[row].cells.push(WalkCell {
            field_ref,
            field_type,
            value,
        });
    }
}

// Scalar run under construction; `field_type` stays open while only nulls
// have been seen.
struct OpenRun<'d> {
    field_type: Option<FieldType>,
    start: usize,
    elements: Vec<Option<&'d DocValue>>,
}

///
/// Walker
///

pub(crate) struct Walker<'s> {
    snapshot: &'s CatalogSnapshot,
    database: &'s str,
    collection: &'s str,
    seen_fields: BTreeMap<TableRef, BTreeSet<FieldType>>,
    seen_scalars: BTreeMap<TableRef, BTreeSet<FieldType>>,
}

impl<'s> Walker<'s> {
    pub(crate) const fn new(
        snapshot: &'s CatalogSnapshot,
        database: &'s str,
        collection: &'s str,
    ) -> Self {
        Self {
            snapshot,
            database,
            collection,
            seen_fields: BTreeMap::new(),
            seen_scalars: BTreeMap::new(),
        }
    }

    pub(crate) fn walk<'d>(&mut self, document: &'d Document) -> WalkedDoc<'d> {
        let mut out = WalkedDoc::default();
        let root = out.push_row(TableRef::root(), None, None);
        self.walk_object(&mut out, root, &TableRef::root(), document);

        out
    }

    fn walk_object<'d>(
        &mut self,
        out: &mut WalkedDoc<'d>,
        row: usize,
        table_ref: &TableRef,
        document: &'d Document,
    ) {
        for (key, value) in document.iter() {
            self.walk_value(out, row, table_ref.field(key), value);
        }
    }

    fn walk_value<'d>(
        &mut self,
        out: &mut WalkedDoc<'d>,
        row: usize,
        field_ref: TableRef,
        value: &'d DocValue,
    ) {
        match value {
            DocValue::Document(document) => {
                out.push_cell(row, field_ref.clone(), FieldType::Document, Cell::Present);
                let child = out.push_row(field_ref.clone(), Some(row), None);
                self.walk_object(out, child, &field_ref, document);
            }
            DocValue::Array(elements) => {
                out.push_cell(
                    row,
                    field_ref.clone(),
                    FieldType::Array,
                    Cell::Count(elements.len()),
                );
                self.walk_array(out, row, &field_ref, elements);
            }
            DocValue::Null => {
                let field_type = self.null_field_type(&field_ref);
                self.note(&field_ref, field_type, false);
                out.push_cell(row, field_ref, field_type, Cell::Value(value));
            }
            scalar => {
                let field_type = scalar.field_type();
                self.note(&field_ref, field_type, false);
                out.push_cell(row, field_ref, field_type, Cell::Value(value));
            }
        }
    }

    fn walk_array<'d>(
        &mut self,
        out: &mut WalkedDoc<'d>,
        owner: usize,
        array_ref: &TableRef,
        elements: &'d [DocValue],
    ) {
        let mut open: Option<OpenRun<'d>> = None;

        for (i, element) in elements.iter().enumerate() {
            match element {
                DocValue::Document(document) => {
                    self.close_run(out, owner, array_ref, open.take());
                    let row = out.push_row(array_ref.clone(), Some(owner), Some(i));
                    self.walk_object(out, row, array_ref, document);
                }
                DocValue::Array(inner) => {
                    self.close_run(out, owner, array_ref, open.take());
                    let row = out.push_row(array_ref.clone(), Some(owner), Some(i));
                    let inner_ref = array_ref.element();
                    out.push_cell(
                        row,
                        inner_ref.clone(),
                        FieldType::Array,
                        Cell::Count(inner.len()),
                    );
                    self.walk_array(out, row, &inner_ref, inner);
                }
                DocValue::Null => {
                    open.get_or_insert_with(|| OpenRun {
                        field_type: None,
                        start: i,
                        elements: Vec::new(),
                    })
                    .elements
                    .push(None);
                }
                scalar => {
                    let field_type = scalar.field_type();
                    let joins = open
                        .as_ref()
                        .is_some_and(|run| run.field_type.is_none_or(|ft| ft == field_type));
                    if !joins {
                        self.close_run(out, owner, array_ref, open.take());
                    }

                    let run = open.get_or_insert_with(|| OpenRun {
                        field_type: None,
                        start: i,
                        elements: Vec::new(),
                    });
                    run.field_type = Some(field_type);
                    run.elements.push(Some(scalar));
                }
            }
        }

        self.close_run(out, owner, array_ref, open);
    }

    fn close_run<'d>(
        &mut self,
        out: &mut WalkedDoc<'d>,
        owner: usize,
        array_ref: &TableRef,
        run: Option<OpenRun<'d>>,
    ) {
        let Some(run) = run else {
            return;
        };

        let field_type = run
            .field_type
            .unwrap_or_else(|| self.null_run_type(array_ref));
        self.note(array_ref, field_type, true);
        out.runs.push(WalkRun {
            array_ref: array_ref.clone(),
            field_type,
            owner,
            start: run.start,
            elements: run.elements,
        });
    }

    fn note(&mut self, table_ref: &TableRef, field_type: FieldType, scalar: bool) {
        let seen = if scalar {
            &mut self.seen_scalars
        } else {
            &mut self.seen_fields
        };
        seen.entry(table_ref.clone()).or_default().insert(field_type);
    }

    /// Lowest scalar FieldType observed at the path, else `Null`.
    fn null_field_type(&self, field_ref: &TableRef) -> FieldType {
        let known = self
            .snapshot
            .field_types(self.database, self.collection, field_ref);
        lowest_typed(known, self.seen_fields.get(field_ref))
    }

    /// Lowest element FieldType observed for the array, else `Null`.
    fn null_run_type(&self, array_ref: &TableRef) -> FieldType {
        let known = self
            .snapshot
            .scalar_types(self.database, self.collection, array_ref);
        lowest_typed(known, self.seen_scalars.get(array_ref))
    }
}

fn lowest_typed(
    known: impl Iterator<Item = FieldType>,
    seen: Option<&BTreeSet<FieldType>>,
) -> FieldType {
    known
        .chain(seen.into_iter().flatten().copied())
        .filter(|ft| *ft != FieldType::Null)
        .min()
        .unwrap_or(FieldType::Null)
}
