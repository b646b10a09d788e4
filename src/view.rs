use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::trace;

use crate::record::{Field, Record};

/// Per field filter text as typed by the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    values: [String; 6],
}

impl FilterCriteria {
    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: Field, text: impl Into<String>) {
        self.values[field.index()] = text.into();
    }

    pub fn clear(&mut self) {
        for v in self.values.iter_mut() {
            v.clear();
        }
    }

    /// Trimmed, lower cased criteria that are non empty.
    pub fn active(&self) -> Vec<(Field, String)> {
        Field::ALL
            .iter()
            .map(|&f| (f, self.get(f).trim().to_lowercase()))
            .filter(|(_, c)| !c.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    Ascending,
    Descending,
    #[default]
    None,
}

/// The two sort affordances. Both drive the same [`SortMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortButton {
    Ascending,
    Descending,
}

impl SortMode {
    /// Pressing the active button switches sorting off, pressing the other
    /// one switches straight to its direction.
    pub fn toggle(self, button: SortButton) -> SortMode {
        match (self, button) {
            (SortMode::Ascending, SortButton::Ascending) => SortMode::None,
            (SortMode::Descending, SortButton::Descending) => SortMode::None,
            (_, SortButton::Ascending) => SortMode::Ascending,
            (_, SortButton::Descending) => SortMode::Descending,
        }
    }

    pub fn is_pressed(&self, button: SortButton) -> bool {
        matches!(
            (self, button),
            (SortMode::Ascending, SortButton::Ascending)
                | (SortMode::Descending, SortButton::Descending)
        )
    }
}

fn matches_any(record: &Record, active: &[(Field, String)]) -> bool {
    active.iter().any(|(field, criterion)| {
        record
            .text(*field)
            .map(|v| v.to_lowercase().contains(criterion.as_str()))
            .unwrap_or(false)
    })
}

/// Indices into `source` of the records to display, in display order.
pub fn derive_rows(source: &[Record], criteria: &FilterCriteria, sort: SortMode) -> Vec<usize> {
    let active = criteria.active();

    let mut rows: Vec<usize> = if active.is_empty() {
        (0..source.len()).collect()
    } else {
        // Ordered collect keeps the source order of the matches
        source
            .par_iter()
            .enumerate()
            .filter(|(_, record)| matches_any(record, &active))
            .map(|(idx, _)| idx)
            .collect()
    };

    // sort_by is stable, ties keep the filter order
    match sort {
        SortMode::None => {}
        SortMode::Ascending => rows.sort_by(|&a, &b| compare_bytes_used(&source[a], &source[b])),
        SortMode::Descending => rows.sort_by(|&a, &b| compare_bytes_used(&source[b], &source[a])),
    }

    trace!(
        "Derived {} of {} rows, {} active criteria, sort {:?}",
        rows.len(),
        source.len(),
        active.len(),
        sort
    );
    rows
}

fn compare_bytes_used(a: &Record, b: &Record) -> Ordering {
    a.bytes_used_key()
        .partial_cmp(&b.bytes_used_key())
        .unwrap_or(Ordering::Equal)
}

/// Filtered then sorted view over `source`.
pub fn derive<'a>(
    source: &'a [Record],
    criteria: &FilterCriteria,
    sort: SortMode,
) -> Vec<&'a Record> {
    derive_rows(source, criteria, sort)
        .into_iter()
        .map(|idx| &source[idx])
        .collect()
}
