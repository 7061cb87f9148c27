// ⚠️ Error Taxonomy
// Every failure the form can hit, grouped by how the caller must react

use thiserror::Error;

/// Errors raised by the library.
///
/// `DataLoad` and `LookupNotFound` are fatal at startup. Everything else is
/// caught by the flow controller and turned into a feedback message.
#[derive(Debug, Error)]
pub enum DotacaoError {
    #[error("Erro ao carregar o arquivo de referência: {0}")]
    DataLoad(String),

    #[error(
        "Planilha não encontrada. Verifique:\n  1. ID da planilha: {spreadsheet_id}\n  2. Compartilhamento com: {service_account_email}"
    )]
    LookupNotFound {
        spreadsheet_id: String,
        service_account_email: String,
    },

    #[error("Valor inválido: {0}")]
    InvalidAmount(String),

    #[error("{0}")]
    Remote(String),

    #[error("Opção desconhecida para {field}: {value}")]
    UnknownOption { field: &'static str, value: String },

    #[error("Campo obrigatório não preenchido: {0}")]
    IncompleteForm(&'static str),

    #[error("Data inválida: {0} (use DD/MM/AAAA)")]
    InvalidDate(String),

    #[error("Credencial inválida: {0}")]
    Credentials(String),

    #[error("Erro de configuração: {0}")]
    Config(String),
}

impl DotacaoError {
    /// Errors that must stop the process before the form is shown.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DotacaoError::DataLoad(_)
                | DotacaoError::LookupNotFound { .. }
                | DotacaoError::Credentials(_)
                | DotacaoError::Config(_)
        )
    }
}

impl From<reqwest::Error> for DotacaoError {
    fn from(err: reqwest::Error) -> Self {
        DotacaoError::Remote(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DotacaoError>;
