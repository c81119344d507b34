//! HTTP client for the spreadsheet REST API
//!
//! Speaks the Sheets v4 protocol: `values` endpoints for range reads and
//! writes, `:batchUpdate` for structural changes. Every failure comes back
//! as a [`RemoteError`] carrying either the HTTP status or a transport code.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Grid, RemoteError, RemoteResult, SheetInfo, SheetRequest, SheetsApi};
use crate::codec::{A1Range, CellValue};
use crate::error::{Error, Result};

/// HTTP client bound to one spreadsheet.
pub struct HttpSheets {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpSheets {
    /// Create a client for `spreadsheet_id` authorized with `access_token`.
    pub fn new(
        endpoint: &str,
        spreadsheet_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", access_token))
                .map_err(|e| Error::Auth(format!("invalid access token: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: format!(
                "{}/spreadsheets/{}",
                endpoint.trim_end_matches('/'),
                urlencoding::encode(spreadsheet_id)
            ),
        })
    }

    fn values_url(&self, range: &A1Range, suffix: &str) -> String {
        format!(
            "{}/values/{}{}",
            self.base_url,
            urlencoding::encode(&range.to_string()),
            suffix
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<Value> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            let text = response.text().await.map_err(transport_error)?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| RemoteError::other(format!("failed to parse response: {}", e)));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());

        let mut error = RemoteError::status(status.as_u16(), api_message(&body));
        error.retry_after = retry_after;
        Err(error)
    }
}

#[async_trait]
impl SheetsApi for HttpSheets {
    async fn sheets(&self) -> RemoteResult<Vec<SheetInfo>> {
        let body = self
            .send(
                self.http_client
                    .get(&self.base_url)
                    .query(&[("fields", "sheets.properties")]),
            )
            .await?;

        let parsed: SpreadsheetBody = serde_json::from_value(body)
            .map_err(|e| RemoteError::other(format!("failed to parse sheet list: {}", e)))?;
        Ok(parsed
            .sheets
            .into_iter()
            .map(|s| SheetInfo {
                title: s.properties.title,
                sheet_id: s.properties.sheet_id,
                rows: s.properties.grid_properties.row_count,
                columns: s.properties.grid_properties.column_count,
            })
            .collect())
    }

    async fn get_values(&self, range: &A1Range) -> RemoteResult<Grid> {
        let body = self
            .send(self.http_client.get(self.values_url(range, "")).query(&[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("majorDimension", "ROWS"),
            ]))
            .await?;

        let rows = body
            .get("values")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(CellValue::from_json).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn update_values(&self, range: &A1Range, rows: Grid) -> RemoteResult<()> {
        let body = json!({
            "range": range.to_string(),
            "majorDimension": "ROWS",
            "values": encode_rows(&rows),
        });
        self.send(
            self.http_client
                .put(self.values_url(range, ""))
                .query(&[("valueInputOption", "USER_ENTERED")])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn append_values(&self, range: &A1Range, rows: Grid) -> RemoteResult<()> {
        let body = json!({
            "range": range.to_string(),
            "majorDimension": "ROWS",
            "values": encode_rows(&rows),
        });
        self.send(
            self.http_client
                .post(self.values_url(range, ":append"))
                .query(&[
                    ("valueInputOption", "USER_ENTERED"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn clear_values(&self, range: &A1Range) -> RemoteResult<()> {
        self.send(
            self.http_client
                .post(self.values_url(range, ":clear"))
                .json(&json!({})),
        )
        .await?;
        Ok(())
    }

    async fn batch_update(&self, requests: Vec<SheetRequest>) -> RemoteResult<()> {
        let needs_ids = requests
            .iter()
            .any(|r| !matches!(r, SheetRequest::AddSheet { .. }));
        let known = if needs_ids {
            self.sheets().await?
        } else {
            Vec::new()
        };
        let sheet_id = |title: &str| -> RemoteResult<i64> {
            known
                .iter()
                .find(|s| s.title == title)
                .map(|s| s.sheet_id)
                .ok_or_else(|| RemoteError::status(400, format!("No grid with title: {}", title)))
        };

        let mut encoded = Vec::with_capacity(requests.len());
        for request in &requests {
            encoded.push(match request {
                SheetRequest::AddSheet {
                    title,
                    rows,
                    columns,
                } => json!({"addSheet": {"properties": {
                    "title": title,
                    "gridProperties": {"rowCount": rows, "columnCount": columns},
                }}}),
                SheetRequest::DeleteSheet { title } => {
                    json!({"deleteSheet": {"sheetId": sheet_id(title)?}})
                }
                SheetRequest::DeleteColumns { sheet, start, end } => json!({"deleteDimension": {
                    "range": {
                        "sheetId": sheet_id(sheet)?,
                        "dimension": "COLUMNS",
                        "startIndex": start,
                        "endIndex": end,
                    }
                }}),
                SheetRequest::AppendColumns { sheet, count } => json!({"appendDimension": {
                    "sheetId": sheet_id(sheet)?,
                    "dimension": "COLUMNS",
                    "length": count,
                }}),
                SheetRequest::AppendRows { sheet, count } => json!({"appendDimension": {
                    "sheetId": sheet_id(sheet)?,
                    "dimension": "ROWS",
                    "length": count,
                }}),
            });
        }

        self.send(
            self.http_client
                .post(format!("{}:batchUpdate", self.base_url))
                .json(&json!({ "requests": encoded })),
        )
        .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetBody {
    #[serde(default)]
    sheets: Vec<SheetBody>,
}

#[derive(Debug, Deserialize)]
struct SheetBody {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

/// Encode cells for `USER_ENTERED` input.
///
/// Text is prefixed with `'` so the service stores it literally instead of
/// parsing numbers, dates or formulas out of it. Formulas go out unescaped.
fn encode_rows(rows: &Grid) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| Value::Array(row.iter().map(encode_cell).collect()))
            .collect(),
    )
}

fn encode_cell(cell: &CellValue) -> Value {
    match cell {
        CellValue::Text(s) if !s.is_empty() => Value::String(format!("'{}", s)),
        other => other.to_json(),
    }
}

/// Pull `error.message` out of a Google-style error body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Map a reqwest failure onto a transport error code.
pub(crate) fn transport_error(error: reqwest::Error) -> RemoteError {
    let code = if error.is_timeout() {
        Some("ETIMEDOUT")
    } else if error.is_connect() {
        Some("ECONNREFUSED")
    } else if error.is_request() || error.is_body() {
        Some("ECONNRESET")
    } else {
        None
    };
    match code {
        Some(code) => RemoteError::transport(code, format!("HTTP request failed: {}", error)),
        None => RemoteError::other(format!("HTTP request failed: {}", error)),
    }
}
