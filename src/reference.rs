// 📚 Reference Data Loader
// Reads the allocation table (unit / budget line / sequential code) once at startup

use crate::error::{DotacaoError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Header of the unit column (Órgão)
pub const UNIT_HEADER: &str = "ÓRGÃO";
/// Header of the budget line column (Dotação)
pub const BUDGET_LINE_HEADER: &str = "DOTAÇÃO";
/// Header of the sequential code column (Sequencial)
pub const SEQUENTIAL_HEADER: &str = "SEQUENCIAL";

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRow {
    pub unit: String,
    pub budget_line: String,
    pub sequential_code: i64,
}

impl ReferenceRow {
    pub fn new(unit: &str, budget_line: &str, sequential_code: i64) -> Self {
        Self {
            unit: unit.to_string(),
            budget_line: budget_line.to_string(),
            sequential_code,
        }
    }
}

/// Immutable lookup table. Never mutated after `load`.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    rows: Vec<ReferenceRow>,
}

impl ReferenceTable {
    pub fn from_rows(rows: Vec<ReferenceRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ReferenceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct units in sorted order
    pub fn distinct_units(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.unit.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load the reference table from a workbook or a CSV file.
///
/// Spreadsheet extensions go through calamine (first worksheet only);
/// everything else is read as CSV. The three key headers must be present,
/// extra columns are ignored.
pub fn load(path: &Path) -> Result<ReferenceTable> {
    if !path.exists() {
        return Err(DotacaoError::DataLoad(format!(
            "arquivo não encontrado: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let table = if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        load_workbook(path)?
    } else {
        load_csv(path)?
    };

    tracing::info!(path = %path.display(), rows = table.len(), "reference table loaded");
    Ok(table)
}

/// Cell value before coercion into a `ReferenceRow` field
#[derive(Debug, Clone, PartialEq)]
enum RawCell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
}

impl RawCell {
    fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn as_label(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.trim().to_string(),
            RawCell::Int(i) => i.to_string(),
            RawCell::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (*f as i64).to_string()
            }
            RawCell::Float(f) => f.to_string(),
        }
    }

    fn as_code(&self) -> Option<i64> {
        match self {
            RawCell::Int(i) => Some(*i),
            RawCell::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            RawCell::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }
}

impl From<&Data> for RawCell {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => RawCell::Empty,
            Data::Int(i) => RawCell::Int(*i),
            Data::Float(f) => RawCell::Float(*f),
            Data::String(s) => RawCell::Text(s.clone()),
            Data::Bool(b) => RawCell::Text(b.to_string()),
            Data::DateTime(dt) => RawCell::Float(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
            Data::Error(e) => RawCell::Text(e.to_string()),
        }
    }
}

fn load_csv(path: &Path) -> Result<ReferenceTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DotacaoError::DataLoad(format!("falha ao abrir CSV: {}", e)))?;

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| DotacaoError::DataLoad(format!("falha ao ler cabeçalho: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record =
            result.map_err(|e| DotacaoError::DataLoad(format!("falha ao ler linha: {}", e)))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    build_table(&headers, rows)
}

fn load_workbook(path: &Path) -> Result<ReferenceTable> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| DotacaoError::DataLoad(format!("falha ao abrir planilha: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DotacaoError::DataLoad("planilha sem abas".to_string()))?
        .map_err(|e| DotacaoError::DataLoad(format!("falha ao ler aba: {}", e)))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| RawCell::from(cell).as_label())
            .collect(),
        None => Vec::new(),
    };

    let rows = sheet_rows
        .map(|row| row.iter().map(RawCell::from).collect())
        .collect();

    build_table(&headers, rows)
}

fn column_index(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| DotacaoError::DataLoad(format!("coluna ausente: {}", name)))
}

fn build_table(headers: &[String], rows: Vec<Vec<RawCell>>) -> Result<ReferenceTable> {
    let unit_idx = column_index(headers, UNIT_HEADER)?;
    let line_idx = column_index(headers, BUDGET_LINE_HEADER)?;
    let code_idx = column_index(headers, SEQUENTIAL_HEADER)?;

    let mut table_rows = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let cell = |idx: usize| row.get(idx).cloned().unwrap_or(RawCell::Empty);
        let (unit, line, code) = (cell(unit_idx), cell(line_idx), cell(code_idx));

        if unit.is_empty() && line.is_empty() && code.is_empty() {
            continue;
        }

        let sequential_code = code.as_code().ok_or_else(|| {
            DotacaoError::DataLoad(format!(
                "linha {}: {} inválido ({:?})",
                i + 1,
                SEQUENTIAL_HEADER,
                code.as_label()
            ))
        })?;

        table_rows.push(ReferenceRow {
            unit: unit.as_label(),
            budget_line: line.as_label(),
            sequential_code,
        });
    }

    Ok(ReferenceTable::from_rows(table_rows))
}
