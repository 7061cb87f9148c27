// 🔽 Cascading Selector
// unit → budget line → sequential code, each step a pure filter over the reference table

use crate::reference::ReferenceTable;
use serde::Serialize;
use std::collections::BTreeSet;

// ============================================================================
// FILTERS
// ============================================================================

/// Sorted distinct units.
pub fn units_for(table: &ReferenceTable) -> Vec<String> {
    table.distinct_units()
}

/// Sorted distinct budget lines belonging to `unit`. Empty when the unit is unknown.
pub fn budget_lines_for(table: &ReferenceTable, unit: &str) -> Vec<String> {
    table
        .rows()
        .iter()
        .filter(|row| row.unit == unit)
        .map(|row| row.budget_line.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorted distinct sequential codes for the `unit` + `budget_line` pair.
pub fn sequential_codes_for(table: &ReferenceTable, unit: &str, budget_line: &str) -> Vec<i64> {
    table
        .rows()
        .iter()
        .filter(|row| row.unit == unit && row.budget_line == budget_line)
        .map(|row| row.sequential_code)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ============================================================================
// SELECTION
// ============================================================================

/// The user's current picks.
///
/// Setters keep the dependency chain consistent: changing an ancestor
/// clears every descendant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    unit: Option<String>,
    budget_line: Option<String>,
    sequential_code: Option<i64>,
}

impl Selection {
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn budget_line(&self) -> Option<&str> {
        self.budget_line.as_deref()
    }

    pub fn sequential_code(&self) -> Option<i64> {
        self.sequential_code
    }

    pub fn set_unit(&mut self, unit: Option<String>) {
        if self.unit != unit {
            self.budget_line = None;
            self.sequential_code = None;
        }
        self.unit = unit;
    }

    /// Ignored while no unit is set.
    pub fn set_budget_line(&mut self, budget_line: Option<String>) {
        if self.unit.is_none() {
            return;
        }
        if self.budget_line != budget_line {
            self.sequential_code = None;
        }
        self.budget_line = budget_line;
    }

    /// Ignored while no budget line is set.
    pub fn set_sequential_code(&mut self, code: Option<i64>) {
        if self.budget_line.is_none() {
            return;
        }
        self.sequential_code = code;
    }

    pub fn is_complete(&self) -> bool {
        self.unit.is_some() && self.budget_line.is_some() && self.sequential_code.is_some()
    }

    pub fn clear(&mut self) {
        *self = Selection::default();
    }
}
