use crate::google_auth::GoogleAuth;
use crate::table::{Table, TableError};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Destination '{0}' not found")]
    DestinationMissing(String),
    #[error("Permission denied for '{0}'")]
    PermissionDenied(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Spreadsheet API returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid API URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Replaces the contents of one tab of a named spreadsheet.
#[async_trait]
pub trait SheetPublisher: Send + Sync {
    /// Returns a URL for the published data.
    async fn publish(
        &self,
        table: &Table,
        destination: &str,
        tab: &str,
    ) -> Result<String, PublishError>;
}

/// Writes `<root>/<destination>/<tab>.csv`.
pub struct CsvDirectoryPublisher {
    root: PathBuf,
}

impl CsvDirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SheetPublisher for CsvDirectoryPublisher {
    async fn publish(
        &self,
        table: &Table,
        destination: &str,
        tab: &str,
    ) -> Result<String, PublishError> {
        let dir = self.root.join(destination);
        tokio::fs::create_dir_all(&dir).await?;
        let path = std::path::absolute(dir.join(format!("{tab}.csv")))?;
        table.write_csv(&path)?;
        info!("Wrote {} rows to {}", table.len(), path.display());
        Ok(Url::from_file_path(&path)
            .map(String::from)
            .unwrap_or_else(|_| path.display().to_string()))
    }
}

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Google Sheets through the Drive v3 and Sheets v4 REST APIs, authenticated
/// as a service account.
pub struct GoogleSheetsPublisher {
    client: reqwest::Client,
    auth: GoogleAuth,
    batch_rows: usize,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetMeta {
    spreadsheet_url: String,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

impl GoogleSheetsPublisher {
    /// `token_env` names a variable whose value, when set, is used as the
    /// bearer token instead of minting one from `key_file`.
    pub fn new(token_env: impl Into<String>, key_file: &Path, batch_rows: usize) -> Self {
        let client = reqwest::Client::new();
        Self {
            auth: GoogleAuth::new(client.clone(), token_env, key_file),
            client,
            batch_rows: batch_rows.max(1),
        }
    }

    async fn find_spreadsheet(&self, token: &str, name: &str) -> Result<String, PublishError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            name.replace('\'', "\\'"),
            SPREADSHEET_MIME
        );
        let response = self
            .client
            .get(DRIVE_FILES_URL)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await?;
        let list: FileList = check(response, name).await?.json().await?;
        list.files
            .into_iter()
            .next()
            .map(|file| file.id)
            .ok_or_else(|| PublishError::DestinationMissing(name.to_string()))
    }

    fn api_url(segments: &[&str]) -> Result<Url, PublishError> {
        let mut url = Url::parse(SHEETS_URL)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn sheet_url(id: &str, suffix: &str) -> Result<Url, PublishError> {
        Self::api_url(&[&format!("{id}{suffix}")])
    }

    fn values_url(id: &str, range: &str, verb: &str) -> Result<Url, PublishError> {
        Self::api_url(&[id, "values", &format!("{range}{verb}")])
    }

    async fn ensure_tab(
        &self,
        token: &str,
        id: &str,
        destination: &str,
        tab: &str,
    ) -> Result<String, PublishError> {
        let mut url = Self::sheet_url(id, "")?;
        url.query_pairs_mut()
            .append_pair("fields", "spreadsheetUrl,sheets.properties.title");
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let meta: SpreadsheetMeta = check(response, destination).await?.json().await?;

        if !meta.sheets.iter().any(|s| s.properties.title == tab) {
            info!("Creating worksheet '{}' in '{}'", tab, destination);
            let body = json!({ "requests": [{ "addSheet": { "properties": { "title": tab } } }] });
            let response = self
                .client
                .post(Self::sheet_url(id, ":batchUpdate")?)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            check(response, destination).await?;
        }
        Ok(meta.spreadsheet_url)
    }
}

/// Splits header plus rows into writes of at most `batch_rows` rows, each
/// tagged with its 1-based starting sheet row.
pub fn batches(table: &Table, batch_rows: usize) -> Vec<(usize, Vec<Vec<String>>)> {
    let batch_rows = batch_rows.max(1);
    let mut all = Vec::with_capacity(table.rows.len() + 1);
    all.push(table.headers.clone());
    all.extend(table.rows.iter().cloned());
    all.chunks(batch_rows)
        .enumerate()
        .map(|(i, chunk)| (i * batch_rows + 1, chunk.to_vec()))
        .collect()
}

fn quoted_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

async fn check(response: Response, destination: &str) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, destination, body))
}

/// 401 means the token was rejected; 403 means the account lacks access to
/// the destination.
fn status_error(status: StatusCode, destination: &str, body: String) -> PublishError {
    match status {
        StatusCode::UNAUTHORIZED => PublishError::Auth(body),
        StatusCode::FORBIDDEN => PublishError::PermissionDenied(destination.to_string()),
        StatusCode::NOT_FOUND => PublishError::DestinationMissing(destination.to_string()),
        _ => PublishError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl SheetPublisher for GoogleSheetsPublisher {
    async fn publish(
        &self,
        table: &Table,
        destination: &str,
        tab: &str,
    ) -> Result<String, PublishError> {
        let token = self.auth.access_token().await?;
        let id = self.find_spreadsheet(&token, destination).await?;
        let spreadsheet_url = self.ensure_tab(&token, &id, destination, tab).await?;
        let tab_range = quoted_tab(tab);

        let response = self
            .client
            .post(Self::values_url(&id, &tab_range, ":clear")?)
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await?;
        check(response, destination).await?;

        for (start_row, values) in batches(table, self.batch_rows) {
            let range = format!("{tab_range}!A{start_row}");
            debug!("Writing {} rows at {}", values.len(), range);
            let mut url = Self::values_url(&id, &range, "")?;
            url.query_pairs_mut()
                .append_pair("valueInputOption", "USER_ENTERED");
            let response = self
                .client
                .put(url)
                .bearer_auth(&token)
                .json(&json!({ "majorDimension": "ROWS", "values": values }))
                .send()
                .await?;
            check(response, destination).await?;
        }

        info!(
            "Published {} rows to '{}' / '{}'",
            table.len(),
            destination,
            tab
        );
        Ok(spreadsheet_url)
    }
}
