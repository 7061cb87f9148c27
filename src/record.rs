// 🧾 Record - one submitted disbursement
// Fixed-field value type, validated at construction, serialized as a flat sheet row

use crate::currency::AmountFormat;
use crate::error::{DotacaoError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Date format written to the ledger and shown to the user
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Ledger header row, in column order
pub const LEDGER_HEADERS: [&str; 5] = ["Data", "Órgão", "Dotação", "Sequencial", "Valor"];

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse `DD/MM/YYYY`.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|_| DotacaoError::InvalidDate(text.to_string()))
}

/// Single cell of a ledger row.
///
/// Serializes untagged so a row becomes a plain JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Integer(i) => write!(f, "{}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    date: NaiveDate,
    unit: String,
    budget_line: String,
    sequential_code: i64,
    amount: Decimal,
    amount_display: String,
}

impl Record {
    /// Build a record; `amount_display` is derived from `format`.
    pub fn new(
        date: NaiveDate,
        unit: &str,
        budget_line: &str,
        sequential_code: i64,
        amount: Decimal,
        format: &AmountFormat,
    ) -> Result<Self> {
        if unit.trim().is_empty() {
            return Err(DotacaoError::IncompleteForm("órgão"));
        }
        if budget_line.trim().is_empty() {
            return Err(DotacaoError::IncompleteForm("dotação"));
        }

        Ok(Self {
            date,
            unit: unit.to_string(),
            budget_line: budget_line.to_string(),
            sequential_code,
            amount,
            amount_display: format.format(amount),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn budget_line(&self) -> &str {
        &self.budget_line
    }

    pub fn sequential_code(&self) -> i64 {
        self.sequential_code
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn amount_display(&self) -> &str {
        &self.amount_display
    }

    /// Row in ledger column order: date, unit, budget line, code, display value.
    pub fn to_row(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(format_date(self.date)),
            CellValue::Text(self.unit.clone()),
            CellValue::Text(self.budget_line.clone()),
            CellValue::Integer(self.sequential_code),
            CellValue::Text(self.amount_display.clone()),
        ]
    }
}

pub fn header_row() -> Vec<CellValue> {
    LEDGER_HEADERS.iter().map(|h| CellValue::from(*h)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record::new(
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
            "SEDUC",
            "12.361.0001",
            3,
            Decimal::new(123456, 2),
            &AmountFormat::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_row_column_order() {
        let row = sample_record().to_row();

        assert_eq!(
            row,
            vec![
                CellValue::Text("07/03/2024".to_string()),
                CellValue::Text("SEDUC".to_string()),
                CellValue::Text("12.361.0001".to_string()),
                CellValue::Integer(3),
                CellValue::Text("R$ 1.234,56".to_string()),
            ]
        );
    }

    #[test]
    fn test_row_serializes_as_flat_array() {
        let json = serde_json::to_value(sample_record().to_row()).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["07/03/2024", "SEDUC", "12.361.0001", 3, "R$ 1.234,56"])
        );
    }

    #[test]
    fn test_empty_unit_rejected() {
        let err = Record::new(
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
            "  ",
            "12.361.0001",
            3,
            Decimal::ONE,
            &AmountFormat::default(),
        )
        .unwrap_err();

        assert!(matches!(err, DotacaoError::IncompleteForm("órgão")));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("31/12/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
        assert!(matches!(parse_date("2024-12-31"), Err(DotacaoError::InvalidDate(_))));
        assert!(parse_date("31/02/2024").is_err());
    }

    #[test]
    fn test_header_row() {
        let headers: Vec<String> = header_row().iter().map(|c| c.to_string()).collect();
        assert_eq!(headers, vec!["Data", "Órgão", "Dotação", "Sequencial", "Valor"]);
    }
}
