// 📒 Remote Ledger Client
// Append-only sheet inside a remote spreadsheet: ensure it exists, then append one row per submission

use crate::error::{DotacaoError, Result};
use crate::record::{CellValue, Record};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ============================================================================
// BACKEND SEAM
// ============================================================================

/// Spreadsheet metadata needed to locate a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub sheets: Vec<String>,
}

/// Grid size of a freshly created sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetCapacity {
    pub rows: u32,
    pub columns: u32,
}

impl Default for SheetCapacity {
    fn default() -> Self {
        Self {
            rows: 1000,
            columns: 20,
        }
    }
}

/// Minimal spreadsheet operations the ledger is built on.
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    /// Fails with `LookupNotFound` when the id does not resolve.
    async fn spreadsheet(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo>;

    async fn add_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        capacity: SheetCapacity,
    ) -> Result<()>;

    async fn append_row(&self, spreadsheet_id: &str, sheet_name: &str, row: &[CellValue])
        -> Result<()>;

    /// True when the sheet's first row holds no values.
    async fn first_row_is_empty(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<bool>;
}

// ============================================================================
// LEDGER
// ============================================================================

/// A located sheet, ready for appends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRef {
    pub spreadsheet_id: String,
    pub spreadsheet_title: String,
    pub sheet_name: String,
}

/// Locate `sheet_name` inside the spreadsheet, creating it when absent.
/// A missing spreadsheet is never created.
///
/// The header row is written whenever the sheet's first row is empty, so a
/// sheet left header-less by an interrupted creation is repaired on the next
/// call instead of taking a data row in row 1.
pub async fn ensure_sheet<B: SheetsBackend + ?Sized>(
    backend: &B,
    spreadsheet_id: &str,
    sheet_name: &str,
    headers: &[CellValue],
    capacity: SheetCapacity,
) -> Result<SheetRef> {
    let info = backend.spreadsheet(spreadsheet_id).await?;

    let created = if info.sheets.iter().any(|name| name == sheet_name) {
        false
    } else {
        tracing::info!(spreadsheet = %spreadsheet_id, sheet = %sheet_name, "creating ledger sheet");
        backend.add_sheet(spreadsheet_id, sheet_name, capacity).await?;
        true
    };

    if created || backend.first_row_is_empty(spreadsheet_id, sheet_name).await? {
        if !created {
            tracing::warn!(sheet = %sheet_name, "ledger sheet has no header row, writing it");
        }
        backend.append_row(spreadsheet_id, sheet_name, headers).await?;
    }

    Ok(SheetRef {
        spreadsheet_id: spreadsheet_id.to_string(),
        spreadsheet_title: info.title,
        sheet_name: sheet_name.to_string(),
    })
}

/// Handle that appends records to one sheet. No retry, no batching.
pub struct RemoteLedger<B: ?Sized> {
    sheet: SheetRef,
    backend: Arc<B>,
}

impl<B: SheetsBackend + ?Sized> RemoteLedger<B> {
    pub fn new(backend: Arc<B>, sheet: SheetRef) -> Self {
        Self { sheet, backend }
    }

    /// Ensure the sheet and return a ledger bound to it.
    pub async fn connect(
        backend: Arc<B>,
        spreadsheet_id: &str,
        sheet_name: &str,
        headers: &[CellValue],
        capacity: SheetCapacity,
    ) -> Result<Self> {
        let sheet = ensure_sheet(&*backend, spreadsheet_id, sheet_name, headers, capacity).await?;
        Ok(Self::new(backend, sheet))
    }

    pub fn sheet(&self) -> &SheetRef {
        &self.sheet
    }

    pub async fn append_record(&self, record: &Record) -> Result<()> {
        let row = record.to_row();
        self.backend
            .append_row(&self.sheet.spreadsheet_id, &self.sheet.sheet_name, &row)
            .await
            .map_err(|e| match e {
                DotacaoError::Remote(_) | DotacaoError::LookupNotFound { .. } => e,
                other => DotacaoError::Remote(other.to_string()),
            })?;

        tracing::info!(
            sheet = %self.sheet.sheet_name,
            unit = %record.unit(),
            budget_line = %record.budget_line(),
            sequential = record.sequential_code(),
            "record appended"
        );
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Call made against `MemoryBackend`, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Spreadsheet(String),
    AddSheet {
        spreadsheet_id: String,
        sheet_name: String,
        capacity: SheetCapacity,
    },
    AppendRow {
        spreadsheet_id: String,
        sheet_name: String,
    },
    FirstRow {
        spreadsheet_id: String,
        sheet_name: String,
    },
}

#[derive(Debug, Default)]
struct MemorySpreadsheet {
    title: String,
    sheets: Vec<(String, Vec<Vec<CellValue>>)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    spreadsheets: HashMap<String, MemorySpreadsheet>,
    calls: Vec<BackendCall>,
    append_failure: Option<String>,
}

/// Spreadsheet service kept in process memory.
///
/// Records every call so callers can check what reached the "remote" side.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spreadsheet(self, spreadsheet_id: &str, title: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.spreadsheets.insert(
                spreadsheet_id.to_string(),
                MemorySpreadsheet {
                    title: title.to_string(),
                    sheets: Vec::new(),
                },
            );
        }
        self
    }

    /// Make every following append fail with `message` (None restores success).
    pub fn fail_appends(&self, message: Option<&str>) {
        if let Ok(mut state) = self.state.lock() {
            state.append_failure = message.map(str::to_string);
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn rows(&self, spreadsheet_id: &str, sheet_name: &str) -> Vec<Vec<CellValue>> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        let rows = state
            .spreadsheets
            .get(spreadsheet_id)
            .and_then(|sp| sp.sheets.iter().find(|(name, _)| name == sheet_name))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        rows
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| DotacaoError::Remote("memory backend poisoned".to_string()))
    }
}

fn not_found(spreadsheet_id: &str) -> DotacaoError {
    DotacaoError::LookupNotFound {
        spreadsheet_id: spreadsheet_id.to_string(),
        service_account_email: "(memória)".to_string(),
    }
}

#[async_trait]
impl SheetsBackend for MemoryBackend {
    async fn spreadsheet(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo> {
        let mut state = self.lock()?;
        state.calls.push(BackendCall::Spreadsheet(spreadsheet_id.to_string()));

        let sp = state
            .spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;

        Ok(SpreadsheetInfo {
            title: sp.title.clone(),
            sheets: sp.sheets.iter().map(|(name, _)| name.clone()).collect(),
        })
    }

    async fn add_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        capacity: SheetCapacity,
    ) -> Result<()> {
        let mut state = self.lock()?;
        state.calls.push(BackendCall::AddSheet {
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            capacity,
        });

        let sp = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;

        if sp.sheets.iter().any(|(name, _)| name == sheet_name) {
            return Err(DotacaoError::Remote(format!(
                "A sheet with the name \"{}\" already exists",
                sheet_name
            )));
        }
        sp.sheets.push((sheet_name.to_string(), Vec::new()));
        Ok(())
    }

    async fn append_row(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        row: &[CellValue],
    ) -> Result<()> {
        let mut state = self.lock()?;
        state.calls.push(BackendCall::AppendRow {
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
        });

        if let Some(message) = state.append_failure.clone() {
            return Err(DotacaoError::Remote(message));
        }

        let sp = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        let (_, rows) = sp
            .sheets
            .iter_mut()
            .find(|(name, _)| name == sheet_name)
            .ok_or_else(|| DotacaoError::Remote(format!("sheet not found: {}", sheet_name)))?;

        rows.push(row.to_vec());
        Ok(())
    }

    async fn first_row_is_empty(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<bool> {
        let mut state = self.lock()?;
        state.calls.push(BackendCall::FirstRow {
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
        });

        let sp = state
            .spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| not_found(spreadsheet_id))?;
        let (_, rows) = sp
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .ok_or_else(|| DotacaoError::Remote(format!("sheet not found: {}", sheet_name)))?;

        Ok(rows.first().map_or(true, |row| row.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::AmountFormat;
    use crate::record::header_row;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    const ID: &str = "sheet-id";

    fn add_sheet_count(backend: &MemoryBackend) -> usize {
        backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::AddSheet { .. }))
            .count()
    }

    fn sample_record() -> Record {
        Record::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "SEDUC",
            "12.361.0001",
            1,
            Decimal::new(50000, 2),
            &AmountFormat::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_spreadsheet_is_not_created() {
        let backend = MemoryBackend::new();

        let err = ensure_sheet(&backend, ID, "Registros", &header_row(), SheetCapacity::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DotacaoError::LookupNotFound { .. }));
        assert_eq!(add_sheet_count(&backend), 0);
        assert_eq!(backend.calls(), vec![BackendCall::Spreadsheet(ID.to_string())]);
    }

    #[tokio::test]
    async fn test_missing_sheet_created_once_with_headers() {
        let backend = MemoryBackend::new().with_spreadsheet(ID, "Controle");

        let first = ensure_sheet(&backend, ID, "Registros", &header_row(), SheetCapacity::default())
            .await
            .unwrap();
        let second = ensure_sheet(&backend, ID, "Registros", &header_row(), SheetCapacity::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.spreadsheet_title, "Controle");
        assert_eq!(add_sheet_count(&backend), 1);
        assert_eq!(backend.rows(ID, "Registros"), vec![header_row()]);
        assert!(backend.calls().contains(&BackendCall::AddSheet {
            spreadsheet_id: ID.to_string(),
            sheet_name: "Registros".to_string(),
            capacity: SheetCapacity { rows: 1000, columns: 20 },
        }));
    }

    #[tokio::test]
    async fn test_append_after_header() {
        let backend = Arc::new(MemoryBackend::new().with_spreadsheet(ID, "Controle"));
        let ledger = RemoteLedger::connect(
            backend.clone(),
            ID,
            "Registros",
            &header_row(),
            SheetCapacity::default(),
        )
        .await
        .unwrap();

        let record = sample_record();
        ledger.append_record(&record).await.unwrap();
        ledger.append_record(&record).await.unwrap();

        let rows = backend.rows(ID, "Registros");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], header_row());
        assert_eq!(rows[1], record.to_row());
        assert_eq!(rows[2], record.to_row());
    }

    #[tokio::test]
    async fn test_interrupted_creation_gets_header_on_retry() {
        let backend = Arc::new(MemoryBackend::new().with_spreadsheet(ID, "Controle"));

        backend.fail_appends(Some("503"));
        let err = ensure_sheet(&*backend, ID, "Registros", &header_row(), SheetCapacity::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DotacaoError::Remote(_)));
        assert!(backend.rows(ID, "Registros").is_empty());

        backend.fail_appends(None);
        let ledger = RemoteLedger::connect(
            backend.clone(),
            ID,
            "Registros",
            &header_row(),
            SheetCapacity::default(),
        )
        .await
        .unwrap();
        let record = sample_record();
        ledger.append_record(&record).await.unwrap();

        let rows = backend.rows(ID, "Registros");
        assert_eq!(rows, vec![header_row(), record.to_row()]);
        assert_eq!(add_sheet_count(&backend), 1);
    }

    #[tokio::test]
    async fn test_existing_header_is_not_rewritten() {
        let backend = MemoryBackend::new().with_spreadsheet(ID, "Controle");

        for _ in 0..3 {
            ensure_sheet(&backend, ID, "Registros", &header_row(), SheetCapacity::default())
                .await
                .unwrap();
        }

        assert_eq!(backend.rows(ID, "Registros"), vec![header_row()]);
    }

    #[tokio::test]
    async fn test_append_failure_is_remote_error() {
        let backend = Arc::new(MemoryBackend::new().with_spreadsheet(ID, "Controle"));
        let ledger = RemoteLedger::connect(
            backend.clone(),
            ID,
            "Registros",
            &header_row(),
            SheetCapacity::default(),
        )
        .await
        .unwrap();

        backend.fail_appends(Some("503 Service Unavailable"));
        let err = ledger.append_record(&sample_record()).await.unwrap_err();

        match err {
            DotacaoError::Remote(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(backend.rows(ID, "Registros").len(), 1);
    }
}
