//! Google Sheets - the tabular trade source
//!
//! Rows are read as strings; writes address single cells by A1 range.
//! Endpoints: https://developers.google.com/sheets/api/reference/rest

pub mod auth;

pub use auth::GoogleAuth;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::types::CellUpdate;

const SERVICE: &str = "sheets";

pub type Row = Vec<String>;

/// Read/write access to the trade sheet
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn read_rows(&self, range: &str) -> Result<Vec<Row>, ServiceError>;

    async fn write_cells(&self, updates: &[CellUpdate]) -> Result<(), ServiceError>;

    /// Renew whatever authorizes the calls above
    async fn refresh_credentials(&self) -> Result<(), ServiceError>;
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'static str,
    data: Vec<BatchUpdateEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct BatchUpdateEntry<'a> {
    range: &'a str,
    values: [[&'a str; 1]; 1],
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    reason: Option<String>,
}

/// REST client for one spreadsheet
pub struct SheetsClient {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    auth: GoogleAuth,
}

impl SheetsClient {
    pub fn new(client: Client, base_url: &str, spreadsheet_id: &str, auth: GoogleAuth) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            auth,
        }
    }

    fn values_url(&self, suffix: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values{}",
            self.base_url, self.spreadsheet_id, suffix
        )
    }

    async fn check(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = ServiceError::retry_after_header(response.headers());
        let text = response.text().await.unwrap_or_default();
        let (reason, message) = match serde_json::from_str::<GoogleErrorBody>(&text) {
            Ok(body) => (
                body.error.errors.into_iter().find_map(|d| d.reason),
                body.error.message,
            ),
            Err(_) => (None, text),
        };

        Err(ServiceError::Http {
            service: SERVICE,
            status: status.as_u16(),
            reason,
            retry_after,
            message,
        })
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TradeStore for SheetsClient {
    async fn read_rows(&self, range: &str) -> Result<Vec<Row>, ServiceError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(self.values_url(&format!("/{}", range)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ServiceError::transport(SERVICE))?;

        let body: ValueRange = Self::check(response)
            .await?
            .json()
            .await
            .map_err(ServiceError::decode(SERVICE))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn write_cells(&self, updates: &[CellUpdate]) -> Result<(), ServiceError> {
        let request = BatchUpdateRequest {
            value_input_option: "RAW",
            data: updates
                .iter()
                .map(|u| BatchUpdateEntry {
                    range: u.range.as_str(),
                    values: [[u.value.as_str()]],
                })
                .collect(),
        };

        let token = self.auth.access_token().await?;
        let response = self
            .client
            .post(self.values_url(":batchUpdate"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::transport(SERVICE))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn refresh_credentials(&self) -> Result<(), ServiceError> {
        self.auth.refresh().await
    }
}
