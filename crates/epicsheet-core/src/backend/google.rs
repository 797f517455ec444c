//! Google Sheets v4 REST backend.
//!
//! With an access token every operation goes through the authenticated
//! values API. Without one the backend is read-only and reads whole sheets
//! through the public CSV export, slicing the requested range locally.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::backend::{BackendError, Rows, SheetBackend};
use crate::sheet::{A1Range, Grid};

/// Sheets v4 REST endpoint.
pub const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Public export endpoint used without a credential.
pub const EXPORT_BASE: &str = "https://docs.google.com/spreadsheets/d";

const USER_AGENT: &str = concat!("epicsheet/", env!("CARGO_PKG_VERSION"));

/// Request timeout for every call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

/// Client for one spreadsheet.
pub struct GoogleSheetsBackend {
    agent: ureq::Agent,
    spreadsheet_id: String,
    token: Option<String>,
    api_base: String,
    export_base: String,
}

impl std::fmt::Debug for GoogleSheetsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsBackend")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl GoogleSheetsBackend {
    #[must_use]
    pub fn new(spreadsheet_id: &str, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            api_base: API_BASE.to_string(),
            export_base: EXPORT_BASE.to_string(),
        }
    }

    /// Point the client at different endpoints (for proxies and test servers).
    #[must_use]
    pub fn with_endpoints(mut self, api_base: &str, export_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.export_base = export_base.trim_end_matches('/').to_string();
        self
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/{}", self.api_base, self.spreadsheet_id)
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/values/{}", self.spreadsheet_url(), encode_path_segment(range))
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn require_token(&self, range: &str) -> Result<(), BackendError> {
        if self.token.is_some() {
            Ok(())
        } else {
            Err(BackendError::Unauthenticated(format!(
                "no access token configured for {range}"
            )))
        }
    }

    fn send(
        &self,
        request: ureq::Request,
        body: Option<&Value>,
        range: &str,
    ) -> Result<ureq::Response, BackendError> {
        let request = self.authorized(request);
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        result.map_err(|err| map_error(err, range))
    }

    fn export_csv(&self, sheet: &str) -> Result<Rows, BackendError> {
        let url = format!("{}/{}/gviz/tq", self.export_base, self.spreadsheet_id);
        debug!(sheet, "reading sheet through public export");
        let response = self
            .agent
            .get(&url)
            .query("tqx", "out:csv")
            .query("headers", "1")
            .query("sheet", sheet)
            .call()
            .map_err(|err| map_error(err, sheet))?;
        let body = response
            .into_string()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        parse_csv(&body)
    }
}

fn map_error(err: ureq::Error, range: &str) -> BackendError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            BackendError::from_status(code, &body, range)
        }
        ureq::Error::Transport(transport) => BackendError::Transport(transport.to_string()),
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_rows(values: Vec<Vec<Value>>) -> Rows {
    values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

/// Percent-encode one URL path segment (RFC 3986 unreserved characters pass).
#[must_use]
pub fn encode_path_segment(raw: &str) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

/// Parse the CSV export. Rows may be ragged; nothing is treated as a header.
///
/// # Errors
///
/// [`BackendError::Malformed`] if the body is not valid CSV.
pub fn parse_csv(body: &str) -> Result<Rows, BackendError> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes())
        .records()
        .map(|record| {
            record
                .map(|record| record.iter().map(str::to_string).collect())
                .map_err(|e| BackendError::Malformed(format!("csv export: {e}")))
        })
        .collect()
}

impl SheetBackend for GoogleSheetsBackend {
    fn batch_read(&self, ranges: &[String]) -> Result<Vec<Rows>, BackendError> {
        if self.token.is_none() {
            return ranges.iter().map(|range| self.read_range(range)).collect();
        }
        let url = format!("{}/values:batchGet", self.spreadsheet_url());
        let request = ranges
            .iter()
            .fold(self.agent.get(&url), |req, range| req.query("ranges", range));
        let response = self.send(request, None, &ranges.join(","))?;
        let parsed: BatchGetResponse = response
            .into_json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        if parsed.value_ranges.len() != ranges.len() {
            return Err(BackendError::Malformed(format!(
                "expected {} value ranges, got {}",
                ranges.len(),
                parsed.value_ranges.len()
            )));
        }
        Ok(parsed
            .value_ranges
            .into_iter()
            .map(|vr| to_rows(vr.values))
            .collect())
    }

    fn read_range(&self, range: &str) -> Result<Rows, BackendError> {
        if self.token.is_none() {
            let parsed =
                A1Range::parse(range).map_err(|_| BackendError::NotFound(range.to_string()))?;
            let grid = Grid::from_rows(self.export_csv(&parsed.sheet)?);
            return Ok(grid.slice(&parsed));
        }
        let response = self.send(self.agent.get(&self.values_url(range)), None, range)?;
        let parsed: ValueRange = response
            .into_json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(to_rows(parsed.values))
    }

    fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        self.require_token(range)?;
        let request = self
            .agent
            .put(&self.values_url(range))
            .query("valueInputOption", "USER_ENTERED");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.send(request, Some(&body), range)?;
        Ok(())
    }

    fn append_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), BackendError> {
        self.require_token(range)?;
        let url = format!("{}:append", self.values_url(range));
        let request = self
            .agent
            .post(&url)
            .query("valueInputOption", "USER_ENTERED")
            .query("insertDataOption", "INSERT_ROWS");
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        self.send(request, Some(&body), range)?;
        Ok(())
    }

    fn list_sheets(&self) -> Result<Vec<String>, BackendError> {
        self.require_token("sheet list")?;
        let request = self
            .agent
            .get(&self.spreadsheet_url())
            .query("fields", "sheets.properties.title");
        let meta: SpreadsheetMeta = self
            .send(request, None, &self.spreadsheet_id)?
            .into_json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    fn create_sheet(&self, name: &str) -> Result<(), BackendError> {
        self.require_token(name)?;
        let url = format!("{}:batchUpdate", self.spreadsheet_url());
        let body = json!({ "requests": [{ "addSheet": { "properties": { "title": name } } }] });
        match self.send(self.agent.post(&url), Some(&body), name) {
            Ok(_) => Ok(()),
            Err(err @ BackendError::AlreadyExists(_)) => Err(err),
            Err(err) => {
                warn!(sheet = name, error = %err, "addSheet failed");
                Err(err)
            }
        }
    }

    fn is_writable(&self) -> bool {
        self.token.is_some()
    }
}
