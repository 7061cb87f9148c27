// ⚙️ Configuration
// TOML file with reference path, ledger location, amount convention and credentials

use crate::credentials::ServiceAccountKey;
use crate::currency::AmountFormat;
use crate::error::{DotacaoError, Result};
use crate::ledger::SheetCapacity;
use crate::sheets::DEFAULT_API_BASE;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at the config file
pub const CONFIG_ENV: &str = "DOTACAO_CONFIG";
/// Config file looked up in the working directory when the variable is unset
pub const DEFAULT_CONFIG_FILE: &str = "dotacao.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub initial_rows: u32,
    pub initial_columns: u32,
    pub api_base: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let capacity = SheetCapacity::default();
        Self {
            spreadsheet_id: "1Gx5-Fd5lW0tO18jwiKilRN3OVjOPoD2t0GSSnpEKvmQ".to_string(),
            sheet_name: "Registros".to_string(),
            initial_rows: capacity.rows,
            initial_columns: capacity.columns,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn capacity(&self) -> SheetCapacity {
        SheetCapacity {
            rows: self.initial_rows,
            columns: self.initial_columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reference_path: PathBuf,
    pub credentials_path: PathBuf,
    pub bind_address: String,
    pub ledger: LedgerConfig,
    pub amount: AmountFormat,
    /// Inline key; wins over `credentials_path` when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcp_service_account: Option<ServiceAccountKey>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from("data/DOTACOES.xlsx"),
            credentials_path: PathBuf::from("credentials.json"),
            bind_address: "0.0.0.0:3000".to_string(),
            ledger: LedgerConfig::default(),
            amount: AmountFormat::default(),
            gcp_service_account: None,
        }
    }
}

impl AppConfig {
    /// `$DOTACAO_CONFIG`, else `dotacao.toml`
    pub fn default_path() -> PathBuf {
        env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let data = fs::read_to_string(path)
            .map_err(|e| DotacaoError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(data).map_err(|e| DotacaoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.amount.validate()?;
        if self.ledger.spreadsheet_id.trim().is_empty() {
            return Err(DotacaoError::Config("ledger.spreadsheet_id vazio".to_string()));
        }
        if self.ledger.sheet_name.trim().is_empty() {
            return Err(DotacaoError::Config("ledger.sheet_name vazio".to_string()));
        }
        Ok(())
    }

    pub fn service_account(&self) -> Result<ServiceAccountKey> {
        match &self.gcp_service_account {
            Some(key) => Ok(key.clone()),
            None => ServiceAccountKey::from_json_file(&self.credentials_path),
        }
    }
}
