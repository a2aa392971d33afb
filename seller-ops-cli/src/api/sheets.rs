//! Google Sheets v4 REST client

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, trace};
use serde::Deserialize;
use serde_json::{Value, json};

use super::resilience::{ResilienceConfig, RetryPolicy};
use super::{check_status, http_client};
use crate::sheets::{
    CellUpdate, CellValue, RowSpan, SheetProperties, SheetRef, SheetsBackend, ValueRender, column_letter,
};

pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Spreadsheet access over the REST API with a bearer token.
///
/// Reads go through the full retry policy. Writes are only retried when the
/// server rejects them outright, so a write is never sent twice after it may
/// have been applied. Nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetMeta {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridMeta {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRangeBody {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsClient {
    pub fn new(token: impl Into<String>, config: &ResilienceConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            token: token.into(),
            base_url: SHEETS_API_URL.to_string(),
            retry: RetryPolicy::new(config.retry.clone()),
        })
    }

    /// Point the client at another endpoint (proxies, emulators)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn spreadsheet_url(&self, sheet: &SheetRef) -> String {
        format!("{}/{}", self.base_url, sheet.spreadsheet_id)
    }

    fn values_url(&self, sheet: &SheetRef, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(sheet),
            urlencoding::encode(range)
        )
    }

    async fn get_json<T>(&self, operation: &str, url: &str, query: &[(&str, &str)]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        trace!("GET {} {:?}", url, query);
        self.retry
            .execute(operation, || {
                let request = self.http.get(url).bearer_auth(&self.token).query(query);
                async move {
                    let response = request.send().await.with_context(|| format!("{} request failed", operation))?;
                    let response = check_status(operation, response).await?;
                    response
                        .json::<T>()
                        .await
                        .with_context(|| format!("Failed to parse {} response", operation))
                }
            })
            .await
    }

    async fn post_json(&self, operation: &str, url: &str, query: &[(&str, &str)], body: &Value) -> Result<Value> {
        trace!("POST {} {:?}", url, query);
        self.retry
            .execute_write(operation, || {
                let request = self.http.post(url).bearer_auth(&self.token).query(query).json(body);
                async move {
                    let response = request.send().await.with_context(|| format!("{} request failed", operation))?;
                    let response = check_status(operation, response).await?;
                    // The write is applied at this point; an unreadable body must not turn it into a failure
                    match response.json::<Value>().await {
                        Ok(value) => Ok(value),
                        Err(e) => {
                            debug!("{}: ignoring unreadable response body: {}", operation, e);
                            Ok(Value::Null)
                        }
                    }
                }
            })
            .await
    }

    async fn read_range(&self, sheet: &SheetRef, range: &str, query: &[(&str, &str)]) -> Result<Vec<Vec<Value>>> {
        let url = self.values_url(sheet, range);
        let body: ValueRangeBody = self
            .get_json("values.get", &url, query)
            .await
            .with_context(|| format!("Failed to read {} of {}", range, sheet))?;
        Ok(body.values)
    }

    async fn batch_update(&self, sheet: &SheetRef, requests: Vec<Value>) -> Result<()> {
        let url = format!("{}:batchUpdate", self.spreadsheet_url(sheet));
        let body = json!({ "requests": requests });
        self.post_json("spreadsheets.batchUpdate", &url, &[], &body).await?;
        Ok(())
    }
}

/// A1 range inside one worksheet; the title is always quoted
pub fn a1_range(title: &str, cells: &str) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    if cells.is_empty() {
        quoted
    } else {
        format!("{}!{}", quoted, cells)
    }
}

fn render_option(render: ValueRender) -> &'static str {
    match render {
        ValueRender::Formatted => "FORMATTED_VALUE",
        ValueRender::Formula => "FORMULA",
    }
}

fn find_sheet(meta: SpreadsheetMeta, sheet: &SheetRef) -> Result<SheetProperties> {
    meta.sheets
        .into_iter()
        .map(|s| s.properties)
        .find(|p| p.title == sheet.title)
        .map(|p| SheetProperties {
            sheet_id: p.sheet_id,
            row_count: p.grid_properties.row_count,
            column_count: p.grid_properties.column_count,
        })
        .ok_or_else(|| anyhow!("Worksheet {} not found", sheet))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => CellValue::from_json(other).to_string(),
    }
}

fn trim_trailing<T>(mut cells: Vec<T>, is_empty: impl Fn(&T) -> bool) -> Vec<T> {
    while cells.last().is_some_and(&is_empty) {
        cells.pop();
    }
    cells
}

/// `copyPaste` request pasting only the format of one row onto a row block
pub fn copy_format_request(sheet_id: i64, source_row: u32, target: RowSpan) -> Value {
    json!({
        "copyPaste": {
            "source": {
                "sheetId": sheet_id,
                "startRowIndex": source_row - 1,
                "endRowIndex": source_row,
            },
            "destination": {
                "sheetId": sheet_id,
                "startRowIndex": target.first - 1,
                "endRowIndex": target.last,
            },
            "pasteType": "PASTE_FORMAT",
        }
    })
}

/// `deleteDimension` requests, highest row first so indices stay valid
pub fn delete_rows_requests(sheet_id: i64, rows: &[u32]) -> Vec<Value> {
    let mut sorted = rows.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    sorted
        .into_iter()
        .map(|row| {
            json!({
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row,
                    }
                }
            })
        })
        .collect()
}

#[async_trait]
impl SheetsBackend for GoogleSheetsClient {
    async fn properties(&self, sheet: &SheetRef) -> Result<SheetProperties> {
        let url = self.spreadsheet_url(sheet);
        let meta: SpreadsheetMeta = self
            .get_json("spreadsheets.get", &url, &[("fields", "sheets.properties")])
            .await
            .with_context(|| format!("Failed to read properties of {}", sheet))?;
        let props = find_sheet(meta, sheet)?;
        debug!("{}: {} rows x {} columns", sheet, props.row_count, props.column_count);
        Ok(props)
    }

    async fn row_values(&self, sheet: &SheetRef, row: u32, render: ValueRender) -> Result<Vec<CellValue>> {
        let range = a1_range(&sheet.title, &format!("{}:{}", row, row));
        let values = self
            .read_range(sheet, &range, &[("valueRenderOption", render_option(render))])
            .await?;
        let cells = values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(CellValue::from_json)
            .collect();
        Ok(trim_trailing(cells, CellValue::is_empty))
    }

    async fn col_values(&self, sheet: &SheetRef, col: u32) -> Result<Vec<String>> {
        let letter = column_letter(col.saturating_sub(1) as usize);
        let range = a1_range(&sheet.title, &format!("{}:{}", letter, letter));
        let values = self
            .read_range(
                sheet,
                &range,
                &[("majorDimension", "COLUMNS"), ("valueRenderOption", "FORMATTED_VALUE")],
            )
            .await?;
        let column = values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(value_to_string)
            .collect();
        Ok(trim_trailing(column, |v: &String| v.is_empty()))
    }

    async fn all_values(&self, sheet: &SheetRef) -> Result<Vec<Vec<String>>> {
        let range = a1_range(&sheet.title, "");
        let values = self
            .read_range(sheet, &range, &[("valueRenderOption", "FORMATTED_VALUE")])
            .await?;
        Ok(values
            .iter()
            .map(|row| row.iter().map(value_to_string).collect())
            .collect())
    }

    async fn append_rows(&self, sheet: &SheetRef, rows: &[Vec<CellValue>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = format!("{}:append", self.values_url(sheet, &a1_range(&sheet.title, "A1")));
        let values: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| row.iter().map(CellValue::to_json).collect())
            .collect();
        let body = json!({ "majorDimension": "ROWS", "values": values });

        self.post_json(
            "values.append",
            &url,
            &[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")],
            &body,
        )
        .await
        .with_context(|| format!("Failed to append {} row(s) to {}", rows.len(), sheet))?;
        Ok(())
    }

    async fn copy_format(&self, sheet: &SheetRef, source_row: u32, target: RowSpan) -> Result<()> {
        if target.is_empty() {
            return Ok(());
        }
        let props = self.properties(sheet).await?;
        self.batch_update(sheet, vec![copy_format_request(props.sheet_id, source_row, target)])
            .await
            .with_context(|| format!("Failed to copy format of row {} in {}", source_row, sheet))
    }

    async fn delete_rows(&self, sheet: &SheetRef, rows: &[u32]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let props = self.properties(sheet).await?;
        self.batch_update(sheet, delete_rows_requests(props.sheet_id, rows))
            .await
            .with_context(|| format!("Failed to delete {} row(s) from {}", rows.len(), sheet))
    }

    async fn update_cells(&self, sheet: &SheetRef, updates: &[CellUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let url = format!("{}/values:batchUpdate", self.spreadsheet_url(sheet));
        let data: Vec<Value> = updates
            .iter()
            .map(|u| {
                let cell = format!("{}{}", column_letter(u.col.saturating_sub(1) as usize), u.row);
                json!({ "range": a1_range(&sheet.title, &cell), "values": [[u.value.to_json()]] })
            })
            .collect();
        let body = json!({ "valueInputOption": "USER_ENTERED", "data": data });

        self.post_json("values.batchUpdate", &url, &[], &body)
            .await
            .with_context(|| format!("Failed to update {} cell(s) in {}", updates.len(), sheet))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RetryConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Local endpoint answering GETs with sheet properties and every POST
    /// with `post_status` and `post_body`. Returns the base URL and the POST counter.
    async fn serve_sheets(post_status: u16, post_body: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let posts = Arc::new(AtomicU32::new(0));
        let counter = posts.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let (status, body) = if request.starts_with("POST") {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (post_status, post_body.to_string())
                    } else {
                        let sheets = json!({ "sheets": [{ "properties": {
                            "sheetId": 7,
                            "title": "MAIN (tested)",
                            "gridProperties": { "rowCount": 10, "columnCount": 3 }
                        }}]});
                        (200, sheets.to_string())
                    };
                    let response = format!(
                        "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}/v4/spreadsheets", addr), posts)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let line = line.to_ascii_lowercase();
                        line.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn local_client(base_url: &str) -> GoogleSheetsClient {
        let config = ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                backoff_multiplier: 1.0,
                jitter: false,
            })
            .request_timeout(Duration::from_secs(5))
            .build();
        GoogleSheetsClient::new("token", &config).unwrap().with_base_url(base_url)
    }

    #[tokio::test]
    async fn test_server_error_on_write_is_sent_once() {
        let (url, posts) = serve_sheets(503, r#"{"error":{"message":"backend error"}}"#).await;
        let client = local_client(&url);
        let sheet = SheetRef::new("abc", "UNIT 2.0", "MAIN (tested)");

        assert!(client.delete_rows(&sheet, &[5]).await.is_err());
        assert_eq!(posts.load(Ordering::SeqCst), 1);

        assert!(client.append_rows(&sheet, &[vec![CellValue::from("wild1")]]).await.is_err());
        assert_eq!(posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_write_is_retried() {
        let (url, posts) = serve_sheets(429, r#"{"error":{"message":"rate limit"}}"#).await;
        let client = local_client(&url);
        let sheet = SheetRef::new("abc", "UNIT 2.0", "MAIN (tested)");

        let err = client.delete_rows(&sheet, &[5]).await.unwrap_err();
        assert_eq!(posts.load(Ordering::SeqCst), 3);
        assert!(format!("{:#}", err).contains("429"));
    }

    #[test]
    fn test_a1_range_quotes_titles() {
        assert_eq!(a1_range("MAIN (tested)", "A1"), "'MAIN (tested)'!A1");
        assert_eq!(a1_range("Bob's", "3:3"), "'Bob''s'!3:3");
        assert_eq!(a1_range("Сопост", ""), "'Сопост'");
    }

    #[test]
    fn test_delete_requests_highest_first() {
        let requests = delete_rows_requests(7, &[3, 10, 5, 10]);
        let starts: Vec<i64> = requests
            .iter()
            .map(|r| r["deleteDimension"]["range"]["startIndex"].as_i64().unwrap())
            .collect();
        assert_eq!(starts, vec![9, 4, 2]);
        assert_eq!(requests[0]["deleteDimension"]["range"]["sheetId"], 7);
    }

    #[test]
    fn test_copy_format_request_ranges() {
        let request = copy_format_request(1, 10, RowSpan::new(11, 13));
        let paste = &request["copyPaste"];
        assert_eq!(paste["source"]["startRowIndex"], 9);
        assert_eq!(paste["source"]["endRowIndex"], 10);
        assert_eq!(paste["destination"]["startRowIndex"], 10);
        assert_eq!(paste["destination"]["endRowIndex"], 13);
        assert_eq!(paste["pasteType"], "PASTE_FORMAT");
    }

    #[test]
    fn test_find_sheet_by_title() {
        let meta: SpreadsheetMeta = serde_json::from_value(json!({
            "sheets": [
                {"properties": {"sheetId": 0, "title": "Сопост", "gridProperties": {"rowCount": 120, "columnCount": 26}}},
                {"properties": {"sheetId": 42, "title": "MAIN (tested)", "gridProperties": {"rowCount": 900, "columnCount": 40}}}
            ]
        }))
        .unwrap();
        let sheet = SheetRef::new("key", "UNIT 2.0", "MAIN (tested)");

        let props = find_sheet(meta, &sheet).unwrap();
        assert_eq!(props, SheetProperties { sheet_id: 42, row_count: 900, column_count: 40 });
    }

    #[test]
    fn test_find_sheet_missing() {
        let meta: SpreadsheetMeta = serde_json::from_value(json!({ "sheets": [] })).unwrap();
        assert!(find_sheet(meta, &SheetRef::new("k", "t", "Автопилот")).is_err());
    }

    #[test]
    fn test_values_url_encodes_range() {
        let client = GoogleSheetsClient::new("token", &ResilienceConfig::disabled())
            .unwrap()
            .with_base_url("http://localhost:9000/v4/spreadsheets/");
        let sheet = SheetRef::new("abc", "UNIT 2.0", "MAIN (tested)");
        assert_eq!(
            client.values_url(&sheet, &a1_range(&sheet.title, "A:A")),
            "http://localhost:9000/v4/spreadsheets/abc/values/%27MAIN%20%28tested%29%27%21A%3AA"
        );
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("wild1")), "wild1");
        assert_eq!(value_to_string(&json!(123)), "123");
        assert_eq!(value_to_string(&Value::Null), "");
    }

    #[tokio::test]
    async fn test_applied_write_with_unreadable_body_succeeds() {
        let (url, posts) = serve_sheets(200, "<html>ok</html>").await;
        let client = local_client(&url);
        let sheet = SheetRef::new("abc", "UNIT 2.0", "MAIN (tested)");

        client.append_rows(&sheet, &[vec![CellValue::from("wild1")]]).await.unwrap();
        assert_eq!(posts.load(Ordering::SeqCst), 1);
    }
}
