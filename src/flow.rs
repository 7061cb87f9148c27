// 🧭 Flow Controller
// Per-session form state: cascading picks, amount, date, submission and feedback

use crate::currency::AmountFormat;
use crate::error::{DotacaoError, Result};
use crate::ledger::{RemoteLedger, SheetsBackend};
use crate::record::{format_date, Record};
use crate::reference::ReferenceTable;
use crate::selector::{budget_lines_for, sequential_codes_for, units_for, Selection};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MSG_EMPTY_AMOUNT: &str = "Por favor, preencha o valor.";
pub const MSG_INVALID_AMOUNT: &str = "Por favor, insira um valor numérico válido (ex: 1.000,00)";

/// Labels of the free-text inputs, as carried by `IncompleteForm`
pub const AMOUNT_LABEL: &str = "valor";
pub const DATE_LABEL: &str = "data";

// ============================================================================
// STATES & FEEDBACK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Only the unit selector is active
    NoUnit,
    /// Budget-line selector active; code, amount, date hidden
    UnitChosen,
    /// Code, amount, date and submit active
    BudgetLineChosen,
}

/// The three user-facing feedback channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Feedback {
    Success(String),
    Error(String),
    Warning(String),
}

impl Feedback {
    pub fn message(&self) -> &str {
        match self {
            Feedback::Success(m) | Feedback::Error(m) | Feedback::Warning(m) => m,
        }
    }
}

/// Selector addressed by a pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Unit,
    BudgetLine,
    SequentialCode,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::Unit => "órgão",
            Field::BudgetLine => "dotação",
            Field::SequentialCode => "sequencial",
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Everything one user interacts with. Sessions never share mutable state;
/// the reference table is shared read-only.
#[derive(Debug, Clone)]
pub struct Session {
    table: Arc<ReferenceTable>,
    format: AmountFormat,
    selection: Selection,
    amount_text: String,
    date: Option<NaiveDate>,
    feedback: Option<Feedback>,
}

impl Session {
    /// Start in `NoUnit` with the date preset to `today`.
    pub fn new(table: Arc<ReferenceTable>, format: AmountFormat, today: NaiveDate) -> Self {
        Self {
            table,
            format,
            selection: Selection::default(),
            amount_text: String::new(),
            date: Some(today),
            feedback: None,
        }
    }

    pub fn state(&self) -> FlowState {
        match (self.selection.unit(), self.selection.budget_line()) {
            (None, _) => FlowState::NoUnit,
            (Some(_), None) => FlowState::UnitChosen,
            (Some(_), Some(_)) => FlowState::BudgetLineChosen,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn amount_text(&self) -> &str {
        &self.amount_text
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn amount_format(&self) -> &AmountFormat {
        &self.format
    }

    // ------------------------------------------------------------------------
    // Option sets
    // ------------------------------------------------------------------------

    pub fn unit_options(&self) -> Vec<String> {
        units_for(&self.table)
    }

    /// Empty until a unit is chosen.
    pub fn budget_line_options(&self) -> Vec<String> {
        match self.selection.unit() {
            Some(unit) => budget_lines_for(&self.table, unit),
            None => Vec::new(),
        }
    }

    /// Empty until a budget line is chosen.
    pub fn sequential_code_options(&self) -> Vec<i64> {
        match (self.selection.unit(), self.selection.budget_line()) {
            (Some(unit), Some(line)) => sequential_codes_for(&self.table, unit, line),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------------

    /// Pick a unit; empty text goes back to `NoUnit`.
    pub fn select_unit(&mut self, unit: &str) -> Result<()> {
        self.feedback = None;
        let unit = unit.trim();

        if unit.is_empty() {
            self.selection.set_unit(None);
        } else if self.unit_options().iter().any(|u| u == unit) {
            self.selection.set_unit(Some(unit.to_string()));
        } else {
            return Err(unknown(Field::Unit, unit));
        }

        tracing::debug!(state = ?self.state(), "unit selected");
        Ok(())
    }

    /// Pick a budget line of the current unit; empty text goes back to `UnitChosen`.
    pub fn select_budget_line(&mut self, budget_line: &str) -> Result<()> {
        self.feedback = None;
        let budget_line = budget_line.trim();

        if self.selection.unit().is_none() {
            return Err(DotacaoError::IncompleteForm(Field::Unit.label()));
        }

        if budget_line.is_empty() {
            self.selection.set_budget_line(None);
        } else if self.budget_line_options().iter().any(|l| l == budget_line) {
            self.selection.set_budget_line(Some(budget_line.to_string()));
        } else {
            return Err(unknown(Field::BudgetLine, budget_line));
        }

        tracing::debug!(state = ?self.state(), "budget line selected");
        Ok(())
    }

    pub fn select_sequential_code(&mut self, code: Option<i64>) -> Result<()> {
        self.feedback = None;

        if self.selection.budget_line().is_none() {
            return Err(DotacaoError::IncompleteForm(Field::BudgetLine.label()));
        }

        if let Some(code) = code {
            if !self.sequential_code_options().contains(&code) {
                return Err(unknown(Field::SequentialCode, &code.to_string()));
            }
        }

        self.selection.set_sequential_code(code);
        Ok(())
    }

    /// Text-valued pick, as sent by the web form.
    pub fn select(&mut self, field: Field, value: &str) -> Result<()> {
        match field {
            Field::Unit => self.select_unit(value),
            Field::BudgetLine => self.select_budget_line(value),
            Field::SequentialCode => {
                let value = value.trim();
                let code = if value.is_empty() {
                    None
                } else {
                    Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| unknown(Field::SequentialCode, value))?,
                    )
                };
                self.select_sequential_code(code)
            }
        }
    }

    pub fn set_amount_text(&mut self, text: &str) {
        self.feedback = None;
        self.amount_text = text.to_string();
    }

    pub fn set_date(&mut self, date: Option<NaiveDate>) {
        self.feedback = None;
        self.date = date;
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Validate the form and build the record, without touching the ledger.
    pub fn prepare(&self) -> Result<Record> {
        let unit = self
            .selection
            .unit()
            .ok_or(DotacaoError::IncompleteForm(Field::Unit.label()))?;
        let budget_line = self
            .selection
            .budget_line()
            .ok_or(DotacaoError::IncompleteForm(Field::BudgetLine.label()))?;
        let code = self
            .selection
            .sequential_code()
            .ok_or(DotacaoError::IncompleteForm(Field::SequentialCode.label()))?;

        if self.amount_text.trim().is_empty() {
            return Err(DotacaoError::IncompleteForm(AMOUNT_LABEL));
        }
        let amount = self.format.parse(&self.amount_text)?;
        let date = self.date.ok_or(DotacaoError::IncompleteForm(DATE_LABEL))?;

        Record::new(date, unit, budget_line, code, amount, &self.format)
    }

    /// Validate, append, and report. Validation failures never reach the
    /// ledger; a failed append leaves the form as it was.
    pub async fn submit<B: SheetsBackend + ?Sized>(&mut self, ledger: &RemoteLedger<B>) -> Feedback {
        let feedback = match self.prepare() {
            Ok(record) => match ledger.append_record(&record).await {
                Ok(()) => Feedback::Success(format!(
                    "Dados enviados com sucesso! Valor registrado: {} Data: {}",
                    record.amount_display(),
                    format_date(record.date())
                )),
                Err(e) => {
                    tracing::warn!(error = %e, "append failed");
                    Feedback::Error(format!("Erro ao enviar dados: {}", e))
                }
            },
            Err(e) => validation_feedback(&e),
        };

        self.feedback = Some(feedback.clone());
        feedback
    }
}

fn unknown(field: Field, value: &str) -> DotacaoError {
    DotacaoError::UnknownOption {
        field: field.label(),
        value: value.to_string(),
    }
}

fn validation_feedback(err: &DotacaoError) -> Feedback {
    match err {
        DotacaoError::IncompleteForm(AMOUNT_LABEL) => Feedback::Warning(MSG_EMPTY_AMOUNT.to_string()),
        DotacaoError::IncompleteForm(field) => {
            Feedback::Warning(format!("Por favor, preencha o campo {}.", field))
        }
        DotacaoError::InvalidAmount(_) => Feedback::Warning(MSG_INVALID_AMOUNT.to_string()),
        other => Feedback::Error(other.to_string()),
    }
}
