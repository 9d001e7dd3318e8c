//! Google Sheets v4 REST client.

use super::auth::ServiceAccountAuth;
use super::SpreadsheetClient;
use crate::utils::errors::{AgentError, Result};
use reqwest::{Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

pub struct SheetsClient {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    base_url: String,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, auth: ServiceAccountAuth) -> Self {
        Self {
            http,
            auth,
            base_url: SHEETS_API.to_string(),
        }
    }

    /// HTTP client with the request timeout used for every API call.
    pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(timeout).build()?)
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        spreadsheet_url(&self.base_url, segments)
    }
}

/// `base` with each segment appended and percent-encoded.
fn spreadsheet_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| AgentError::Report(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| AgentError::Report(format!("cannot extend API url {}", base)))?
        .extend(segments);
    Ok(url)
}

fn parse_titles(body: &str) -> Result<Vec<String>> {
    let meta: SpreadsheetMeta = serde_json::from_str(body)
        .map_err(|e| AgentError::Report(format!("invalid spreadsheet metadata: {}", e)))?;
    Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
}

async fn checked(response: std::result::Result<Response, reqwest::Error>) -> Result<Response> {
    let response = response.map_err(|e| AgentError::Report(e.to_string()))?;
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::Report(format!("HTTP {}: {}", status, body.trim())))
}

impl SpreadsheetClient for SheetsClient {
    async fn tab_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let mut url = self.url(&[spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");

        let token = self.auth.access_token().await?;
        let response = checked(self.http.get(url).bearer_auth(token).send().await).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Report(e.to_string()))?;
        parse_titles(&body)
    }

    async fn add_tab(&self, spreadsheet_id: &str, title: &str) -> Result<()> {
        let url = self.url(&[&format!("{}:batchUpdate", spreadsheet_id)])?;
        let body = json!({
            "requests": [
                { "addSheet": { "properties": { "title": title } } }
            ]
        });

        let token = self.auth.access_token().await?;
        checked(self.http.post(url).bearer_auth(token).json(&body).send().await).await?;
        Ok(())
    }

    async fn append_row(&self, spreadsheet_id: &str, range: &str, row: Vec<String>) -> Result<()> {
        let mut url = self.url(&[spreadsheet_id, "values", &format!("{}:append", range)])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let body = json!({ "values": [row] });

        let token = self.auth.access_token().await?;
        checked(self.http.post(url).bearer_auth(token).json(&body).send().await).await?;
        Ok(())
    }
}
