//! Test selection
//!
//! Turns a catalog and a selection mode into the ordered list of tests to run.

use tracing::debug;

use crate::models::{Catalog, TestSpec};

/// Which part of the catalog a run covers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    /// The basic catalog
    Basic,
    /// Basic followed by extended
    Extended,
    /// Catalog entries named by the filters, with or without extension
    Explicit(Vec<String>),
}

impl SelectionMode {
    /// Resolve the mode from command-line input. `extended` wins over filters.
    pub fn resolve(extended: bool, filters: Vec<String>) -> Self {
        if extended {
            SelectionMode::Extended
        } else if filters.is_empty() {
            SelectionMode::Basic
        } else {
            SelectionMode::Explicit(filters)
        }
    }
}

/// Select tests from the catalog.
///
/// Explicit selection keeps catalog order, not filter order. A filter that
/// names no catalog entry selects nothing and is not an error.
pub fn select(catalog: &Catalog, mode: &SelectionMode) -> Vec<TestSpec> {
    match mode {
        SelectionMode::Basic => catalog.basic.clone(),
        SelectionMode::Extended => catalog.all().cloned().collect(),
        SelectionMode::Explicit(filters) => {
            for filter in filters {
                if !catalog.all().any(|t| t.matches(filter)) {
                    debug!("No catalog entry matches '{}', ignoring", filter);
                }
            }
            catalog
                .all()
                .filter(|t| filters.iter().any(|f| t.matches(f)))
                .cloned()
                .collect()
        }
    }
}
