//! Audit reporting to a spreadsheet.
//!
//! Each job appends one row `(timestamp, status, account, log content)` to
//! the `{backup_type}.{site}` tab of its spreadsheet. Tabs are created on
//! first use with a fixed header row.

pub mod auth;
pub mod sheets;

use crate::executor::job::JobStatus;
use crate::utils::errors::{AgentError, Result};
use std::borrow::Cow;
use tracing::info;

pub use sheets::SheetsClient;

pub const HEADER: [&str; 4] = ["Timestamp", "Status", "Account", "Log Content"];

/// Row timestamp format
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cells hold at most 50,000 characters; stay under with room for the marker.
pub const MAX_LOG_CHARS: usize = 49_000;

const TRUNCATION_MARKER: &str = "[... earlier log output truncated ...]\n";

#[allow(async_fn_in_trait)]
pub trait SpreadsheetClient {
    /// Titles of every tab in the spreadsheet.
    async fn tab_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>>;

    async fn add_tab(&self, spreadsheet_id: &str, title: &str) -> Result<()>;

    /// Append one row below the last non-empty row of `range`.
    async fn append_row(&self, spreadsheet_id: &str, range: &str, row: Vec<String>) -> Result<()>;
}

/// `{tab}!A:D`
pub fn append_range(tab_name: &str) -> String {
    format!("{}!A:D", tab_name)
}

/// Keep the tail of `log` so it fits in a single cell.
pub fn truncate_log(log: &str) -> Cow<'_, str> {
    let total = log.chars().count();
    if total <= MAX_LOG_CHARS {
        return Cow::Borrowed(log);
    }
    let skip = total - MAX_LOG_CHARS;
    let start = log.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    Cow::Owned(format!("{}{}", TRUNCATION_MARKER, &log[start..]))
}

pub struct StatusReporter<C> {
    client: C,
}

impl<C: SpreadsheetClient> StatusReporter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Append the audit row for one job, creating the tab if needed.
    ///
    /// Any API failure comes back as `AgentError::Report`, which callers
    /// treat as fatal to the whole run.
    pub async fn report(
        &self,
        tab_name: &str,
        status: JobStatus,
        account_id: &str,
        spreadsheet_id: &str,
        log_excerpt: &str,
    ) -> Result<()> {
        let range = append_range(tab_name);

        let tabs = self.client.tab_titles(spreadsheet_id).await.map_err(as_report)?;
        if !tabs.iter().any(|t| t == tab_name) {
            info!("Tab '{}' does not exist. Creating it...", tab_name);
            self.client
                .add_tab(spreadsheet_id, tab_name)
                .await
                .map_err(as_report)?;
            self.client
                .append_row(spreadsheet_id, &range, HEADER.iter().map(|h| h.to_string()).collect())
                .await
                .map_err(as_report)?;
        }

        let row = vec![
            chrono::Local::now().format(ROW_TIMESTAMP_FORMAT).to_string(),
            status.to_string(),
            account_id.to_string(),
            truncate_log(log_excerpt).into_owned(),
        ];
        self.client
            .append_row(spreadsheet_id, &range, row)
            .await
            .map_err(as_report)?;

        info!(
            "Successfully logged backup status and log content to Google Sheet: {}",
            status
        );
        Ok(())
    }
}

fn as_report(err: AgentError) -> AgentError {
    match err {
        AgentError::Report(_) => err,
        other => AgentError::Report(other.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySheets;
    use super::*;

    #[tokio::test]
    async fn test_creates_tab_with_header_once() {
        let reporter = StatusReporter::new(MemorySheets::default());

        reporter
            .report("dhcp.branch1", JobStatus::Success, "backup@example.org", "sheet", "run 1")
            .await
            .unwrap();
        reporter
            .report("dhcp.branch1", JobStatus::Failure, "backup@example.org", "sheet", "run 2")
            .await
            .unwrap();

        let rows = reporter.client().rows("sheet", "dhcp.branch1");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>());
        assert_eq!(&rows[1][1..], &["SUCCESS", "backup@example.org", "run 1"]);
        assert_eq!(&rows[2][1..], &["FAILURE", "backup@example.org", "run 2"]);
    }

    #[tokio::test]
    async fn test_existing_tab_gets_no_second_header() {
        let sheets = MemorySheets::default();
        sheets.add_tab("sheet", "dns.branch1").await.unwrap();
        let reporter = StatusReporter::new(sheets);

        reporter
            .report("dns.branch1", JobStatus::Success, "acct", "sheet", "log")
            .await
            .unwrap();

        let rows = reporter.client().rows("sheet", "dns.branch1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "SUCCESS");
    }

    #[tokio::test]
    async fn test_api_failure_is_fatal_report_error() {
        let reporter = StatusReporter::new(MemorySheets {
            fail_appends: true,
            ..Default::default()
        });

        let err = reporter
            .report("dns.branch1", JobStatus::Success, "acct", "sheet", "log")
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncate_log_keeps_tail() {
        let short = "all good\n";
        assert!(matches!(truncate_log(short), Cow::Borrowed(_)));

        let long = format!("{}{}", "a".repeat(10), "b".repeat(MAX_LOG_CHARS));
        let truncated = truncate_log(&long);
        assert!(truncated.starts_with(TRUNCATION_MARKER));
        assert!(truncated.ends_with('b'));
        assert!(!truncated[TRUNCATION_MARKER.len()..].contains('a'));
        assert_eq!(
            truncated.chars().count(),
            MAX_LOG_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_append_range() {
        assert_eq!(append_range("unifi.branch1"), "unifi.branch1!A:D");
    }
}
