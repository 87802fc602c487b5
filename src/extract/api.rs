//! Direct queries against the table's backend endpoint
//!
//! The endpoint speaks the DataTables server-side protocol: `draw`,
//! `start` and `length` parameters in, JSON rows out. Responses come in a
//! few shapes, all normalized here:
//!
//! | Body | Rows |
//! |------|------|
//! | `[...]` | the array itself |
//! | `{"data": [...]}` | `data` |
//! | `{"aaData": [...]}` | `aaData` (legacy DataTables) |
//!
//! A row is either a positional array or a keyed object.

use crate::config::ApiMethod;
use crate::extract::{ExtractError, ExtractedPage, Extractor};
use crate::session::{cookie_header, SessionSupervisor};
use crate::state::{normalize_text, Mode, Record, FIELD_COUNT, HEADER};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::Html;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Builds the HTTP client used for endpoint discovery and API queries
///
/// The cookie store is enabled so that fetching the start page yields the
/// same session cookies a browser would get.
///
/// # Arguments
///
/// * `request_timeout` - Upper bound for a single request
pub fn build_http_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Rows and reported totals from one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiPage {
    pub records: Vec<Record>,
    /// Rows in the response, blank ones included
    pub row_count: usize,
    pub total_records: Option<u64>,
}

/// Normalizes a response body into records
///
/// # Arguments
///
/// * `body` - The parsed JSON body
/// * `columns` - JSON keys for keyed-object rows, in header order
pub fn parse_response(body: &Value, columns: Option<&[String]>) -> Result<ApiPage, ExtractError> {
    let (rows, total_records) = match body {
        Value::Array(rows) => (rows, None),
        Value::Object(map) => {
            let rows = map
                .get("data")
                .or_else(|| map.get("aaData"))
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ExtractError::Malformed("object body without a data array".to_string())
                })?;
            let total = ["recordsFiltered", "recordsTotal", "iTotalDisplayRecords"]
                .iter()
                .find_map(|key| map.get(*key).and_then(as_count));
            (rows, total)
        }
        other => {
            return Err(ExtractError::Malformed(format!(
                "unexpected body type: {}",
                type_name(other)
            )))
        }
    };

    let records = rows
        .iter()
        .filter_map(|row| row_to_record(row, columns))
        .filter(|record| !record.is_blank())
        .collect();

    Ok(ApiPage {
        records,
        row_count: rows.len(),
        total_records,
    })
}

fn row_to_record(row: &Value, columns: Option<&[String]>) -> Option<Record> {
    match row {
        Value::Array(cells) => Some(Record::from_cells(cells.iter().map(value_text))),
        Value::Object(map) => Some(object_to_record(map, columns)),
        other => {
            tracing::debug!("Ignoring {} row in API response", type_name(other));
            None
        }
    }
}

fn object_to_record(map: &Map<String, Value>, columns: Option<&[String]>) -> Record {
    if let Some(columns) = columns {
        return Record::from_cells(
            columns
                .iter()
                .map(|key| map.get(key).map(value_text).unwrap_or_default()),
        );
    }

    // Keys that spell out the header names, in any case or punctuation
    let by_name: Vec<Option<&Value>> = HEADER
        .iter()
        .map(|name| {
            let wanted = header_key(name);
            map.iter()
                .find(|(key, _)| header_key(key) == wanted)
                .map(|(_, value)| value)
        })
        .collect();
    if by_name.iter().all(Option::is_some) {
        return Record::from_cells(by_name.into_iter().flatten().map(value_text));
    }

    Record::from_cells(map.values().take(FIELD_COUNT).map(value_text))
}

fn header_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Text of a JSON cell, with markup reduced to its visible text
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.contains('<') => {
            let fragment = Html::parse_fragment(s);
            normalize_text(&fragment.root_element().text().collect::<String>())
        }
        Value::String(s) => normalize_text(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => normalize_text(&other.to_string()),
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Queries the backend endpoint page by page
pub struct ApiExtractor {
    client: Client,
    endpoint: Url,
    method: ApiMethod,
    page_size: u32,
    columns: Option<Vec<String>>,
    cookie_header: Option<String>,
    user_agent: Option<String>,
    site_url: Url,
    draw: u64,
}

impl ApiExtractor {
    /// Creates an extractor for `endpoint`
    ///
    /// Without explicit cookies the client's own cookie store is relied on.
    pub fn new(client: Client, endpoint: Url, site_url: Url, method: ApiMethod, page_size: u32) -> Self {
        Self {
            client,
            endpoint,
            method,
            page_size: page_size.max(1),
            columns: None,
            cookie_header: None,
            user_agent: None,
            site_url,
            draw: 0,
        }
    }

    /// Sets the JSON keys used for keyed-object rows
    pub fn with_columns(mut self, columns: Option<Vec<String>>) -> Self {
        self.columns = columns;
        self
    }

    /// Sends `Cookie` and `User-Agent` headers copied from the live view
    pub fn with_credentials(mut self, cookie_header: Option<String>, user_agent: Option<String>) -> Self {
        self.cookie_header = cookie_header;
        self.user_agent = user_agent;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Query parameters for a one-based page
    fn params(&self, page: u32) -> [(&'static str, String); 3] {
        let start = u64::from(page.saturating_sub(1)) * u64::from(self.page_size);
        [
            ("draw", self.draw.to_string()),
            ("start", start.to_string()),
            ("length", self.page_size.to_string()),
        ]
    }

    async fn fetch(&mut self, page: u32) -> Result<ApiPage, ExtractError> {
        self.draw += 1;
        let params = self.params(page);

        let mut request = match self.method {
            ApiMethod::Get => self.client.get(self.endpoint.clone()).query(&params),
            ApiMethod::Post => self.client.post(self.endpoint.clone()).form(&params),
        };
        request = request
            .header(ACCEPT, "application/json, text/javascript, */*")
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(cookies) = &self.cookie_header {
            request = request.header(COOKIE, cookies.as_str());
        }
        if let Some(agent) = &self.user_agent {
            request = request.header(USER_AGENT, agent.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if is_expired(status) {
            return Err(ExtractError::SessionExpired(status.as_u16()));
        }
        if !status.is_success() {
            return Err(ExtractError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| ExtractError::Malformed(format!("invalid JSON: {}", e)))?;
        parse_response(&body, self.columns.as_deref())
    }
}

/// 419 is the "page expired" status of CSRF-protected backends
fn is_expired(status: StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 403 | 419)
}

#[async_trait]
impl Extractor for ApiExtractor {
    fn mode(&self) -> Mode {
        Mode::DirectApi
    }

    async fn extract_page(
        &mut self,
        _sessions: &mut SessionSupervisor,
        page: u32,
    ) -> Result<ExtractedPage, ExtractError> {
        let api_page = self.fetch(page).await?;
        // A full page with blank rows in it is still a full page
        let exhausted = api_page.row_count < self.page_size as usize;
        tracing::trace!(
            "Page {}: {} rows from {}",
            page,
            api_page.records.len(),
            self.endpoint
        );
        Ok(ExtractedPage {
            records: api_page.records,
            exhausted,
            total_records: api_page.total_records,
        })
    }

    async fn renew(&mut self, sessions: &mut SessionSupervisor) -> Result<(), ExtractError> {
        if let Some(session) = sessions.current() {
            let cookies = session.cookies().await?;
            let user_agent = session.user_agent().await?;
            tracing::info!("Refreshed {} cookies from the live view", cookies.len());
            self.cookie_header = cookie_header(&cookies);
            self.user_agent = user_agent.or(self.user_agent.take());
        } else {
            // No live view: let the client's cookie store pick up a fresh session
            let response = self.client.get(self.site_url.clone()).send().await?;
            tracing::info!(
                "Refreshed backend session from {} (HTTP {})",
                self.site_url,
                response.status().as_u16()
            );
        }
        Ok(())
    }

    async fn debug_snapshot(&mut self, _sessions: &mut SessionSupervisor) -> Option<String> {
        None
    }
}
