// 🚀 Startup Context
// config → reference table → ledger connection, then one Session per user

use crate::config::AppConfig;
use crate::error::{DotacaoError, Result};
use crate::flow::Session;
use crate::ledger::{RemoteLedger, SheetsBackend};
use crate::record::header_row;
use crate::reference::{self, ReferenceTable};
use crate::sheets::GoogleSheets;
use chrono::Local;
use std::path::Path;
use std::sync::Arc;

/// Process-wide, read-only state shared by every session
pub struct AppContext {
    pub config: AppConfig,
    pub table: Arc<ReferenceTable>,
    pub ledger: Arc<RemoteLedger<dyn SheetsBackend>>,
}

impl AppContext {
    /// Load the reference table and connect to Google Sheets.
    ///
    /// Any error here is fatal: the form cannot work without either side.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let table = Arc::new(reference::load(&config.reference_path)?);
        let key = config.service_account()?;
        let backend: Arc<dyn SheetsBackend> =
            Arc::new(GoogleSheets::new(key, &config.ledger.api_base)?);

        Self::with_backend(config, table, backend).await
    }

    /// Same as `connect`, over an already-built backend.
    pub async fn with_backend(
        config: AppConfig,
        table: Arc<ReferenceTable>,
        backend: Arc<dyn SheetsBackend>,
    ) -> Result<Self> {
        let ledger = RemoteLedger::connect(
            backend,
            &config.ledger.spreadsheet_id,
            &config.ledger.sheet_name,
            &header_row(),
            config.ledger.capacity(),
        )
        .await?;

        tracing::info!(
            title = %ledger.sheet().spreadsheet_title,
            sheet = %ledger.sheet().sheet_name,
            units = table.distinct_units().len(),
            "Conectado à planilha"
        );

        Ok(Self {
            config,
            table,
            ledger: Arc::new(ledger),
        })
    }

    pub fn spreadsheet_title(&self) -> &str {
        &self.ledger.sheet().spreadsheet_title
    }

    /// Fresh session dated today (local time).
    pub fn new_session(&self) -> Session {
        Session::new(
            self.table.clone(),
            self.config.amount.clone(),
            Local::now().date_naive(),
        )
    }
}

/// Lines printed before exiting on a fatal startup error: the error itself,
/// then what to check. `LookupNotFound` carries its own remediation text.
pub fn startup_report(err: &DotacaoError, config_path: &Path, config: &AppConfig) -> Vec<String> {
    let mut lines = vec![format!("❌ {}", err)];

    match err {
        DotacaoError::Config(_) => lines.push(format!(
            "   Verifique o arquivo de configuração: {}",
            config_path.display()
        )),
        DotacaoError::DataLoad(_) => lines.push(format!(
            "   Verifique o arquivo de referência: {}",
            config.reference_path.display()
        )),
        DotacaoError::Credentials(_) => {
            lines.push(format!(
                "   Verifique a chave da conta de serviço: {}",
                config.credentials_path.display()
            ));
            lines.push("   Ou inclua a seção [gcp_service_account] no dotacao.toml".to_string());
        }
        _ => {}
    }

    lines
}
