// ☁️ Google Sheets Backend
// SheetsBackend over the Sheets v4 REST API, authenticated as a service account

use crate::credentials::{ServiceAccountAuth, ServiceAccountKey};
use crate::error::{DotacaoError, Result};
use crate::ledger::{SheetCapacity, SheetsBackend, SpreadsheetInfo};
use crate::record::CellValue;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4";

pub struct GoogleSheets {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    api_base: String,
}

impl GoogleSheets {
    pub fn new(key: ServiceAccountKey, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dotacao-form/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            auth: ServiceAccountAuth::new(key, http.clone()),
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn service_account_email(&self) -> &str {
        self.auth.client_email()
    }

    /// Map a non-2xx response into the error taxonomy.
    async fn check(&self, spreadsheet_id: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(DotacaoError::LookupNotFound {
                spreadsheet_id: spreadsheet_id.to_string(),
                service_account_email: self.service_account_email().to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(DotacaoError::Remote(format!(
            "Erro na API do Google Sheets ({}): {}",
            status,
            api_error_message(&body)
        )))
    }
}

// ============================================================================
// REQUEST SHAPES
// ============================================================================

fn spreadsheet_url(api_base: &str, spreadsheet_id: &str) -> String {
    format!(
        "{}/spreadsheets/{}?fields=properties.title,sheets.properties.title",
        api_base,
        urlencoding::encode(spreadsheet_id)
    )
}

fn batch_update_url(api_base: &str, spreadsheet_id: &str) -> String {
    format!(
        "{}/spreadsheets/{}:batchUpdate",
        api_base,
        urlencoding::encode(spreadsheet_id)
    )
}

/// A1 range addressing the first cell of `sheet_name`; quotes are doubled.
fn sheet_range(sheet_name: &str) -> String {
    format!("'{}'!A1", sheet_name.replace('\'', "''"))
}

fn first_row_url(api_base: &str, spreadsheet_id: &str, sheet_name: &str) -> String {
    format!(
        "{}/spreadsheets/{}/values/{}",
        api_base,
        urlencoding::encode(spreadsheet_id),
        urlencoding::encode(&format!("'{}'!1:1", sheet_name.replace('\'', "''")))
    )
}

fn append_url(api_base: &str, spreadsheet_id: &str, sheet_name: &str) -> String {
    format!(
        "{}/spreadsheets/{}/values/{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
        api_base,
        urlencoding::encode(spreadsheet_id),
        urlencoding::encode(&sheet_range(sheet_name))
    )
}

fn add_sheet_body(sheet_name: &str, capacity: SheetCapacity) -> Value {
    json!({
        "requests": [{
            "addSheet": {
                "properties": {
                    "title": sheet_name,
                    "gridProperties": {
                        "rowCount": capacity.rows,
                        "columnCount": capacity.columns,
                    }
                }
            }
        }]
    })
}

fn append_body(row: &[CellValue]) -> Value {
    json!({ "values": [row] })
}

/// Pull `error.message` out of a Google API error body, if there is one.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    properties: TitleProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: TitleProperties,
}

#[derive(Debug, Deserialize)]
struct TitleProperties {
    #[serde(default)]
    title: String,
}

/// Values of a range; `values` is omitted by the API when the range is empty
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl From<SpreadsheetResponse> for SpreadsheetInfo {
    fn from(resp: SpreadsheetResponse) -> Self {
        Self {
            title: resp.properties.title,
            sheets: resp.sheets.into_iter().map(|s| s.properties.title).collect(),
        }
    }
}

// ============================================================================
// BACKEND
// ============================================================================

#[async_trait]
impl SheetsBackend for GoogleSheets {
    async fn spreadsheet(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(spreadsheet_url(&self.api_base, spreadsheet_id))
            .bearer_auth(token)
            .send()
            .await?;

        let body: SpreadsheetResponse = self.check(spreadsheet_id, response).await?.json().await?;
        Ok(body.into())
    }

    async fn add_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        capacity: SheetCapacity,
    ) -> Result<()> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(batch_update_url(&self.api_base, spreadsheet_id))
            .bearer_auth(token)
            .json(&add_sheet_body(sheet_name, capacity))
            .send()
            .await?;

        self.check(spreadsheet_id, response).await?;
        Ok(())
    }

    async fn append_row(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        row: &[CellValue],
    ) -> Result<()> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(append_url(&self.api_base, spreadsheet_id, sheet_name))
            .bearer_auth(token)
            .json(&append_body(row))
            .send()
            .await?;

        self.check(spreadsheet_id, response).await?;
        Ok(())
    }

    async fn first_row_is_empty(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<bool> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(first_row_url(&self.api_base, spreadsheet_id, sheet_name))
            .bearer_auth(token)
            .send()
            .await?;

        let range: ValueRange = self.check(spreadsheet_id, response).await?.json().await?;
        Ok(range.values.iter().all(|row| {
            row.iter()
                .all(|v| v.is_null() || v.as_str().is_some_and(|s| s.is_empty()))
        }))
    }
}
