//! Google Sheets v4 client for the archive summary sheet.

use async_trait::async_trait;
use reqwest::Method;

use super::client::ApiClient;
use super::error::RemoteError;
use super::types::{cell_text, ValueRange};
use super::SheetStore;

const SERVICE: &str = "Sheets";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Clone)]
pub struct SheetsClient {
    api: ApiClient,
    spreadsheet_id: String,
    sheet: String,
}

/// Sheet name in A1 notation, quoted so names with spaces or punctuation
/// resolve.
fn quoted_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

impl SheetsClient {
    pub fn new(api: ApiClient, spreadsheet_id: impl Into<String>, sheet_name: &str) -> Self {
        Self {
            api,
            spreadsheet_id: spreadsheet_id.into(),
            sheet: quoted_sheet(sheet_name),
        }
    }

    /// Every used cell of the sheet, however many columns it has.
    fn read_range(&self) -> String {
        self.sheet.clone()
    }

    /// Anchor of the write; the written block extends from here.
    fn write_range(&self) -> String {
        format!("{}!A1", self.sheet)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            SHEETS_API_BASE,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(range)
        )
    }
}

#[async_trait]
impl SheetStore for SheetsClient {
    /// Formulas are read back as written so unchanged preview cells compare
    /// equal; dates come back as displayed.
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, RemoteError> {
        let url = format!(
            "{}?valueRenderOption=FORMULA&dateTimeRenderOption=FORMATTED_STRING",
            self.values_url(&self.read_range())
        );
        let range: ValueRange = self.api.json(SERVICE, self.api.get(&url)).await?;
        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn write_rows(&self, rows: &[Vec<String>]) -> Result<(), RemoteError> {
        let range = self.write_range();
        let url = format!("{}?valueInputOption=USER_ENTERED", self.values_url(&range));
        let body = ValueRange {
            range: Some(range),
            values: rows
                .iter()
                .map(|row| row.iter().cloned().map(serde_json::Value::String).collect())
                .collect(),
        };
        self.api
            .send(SERVICE, self.api.request(Method::PUT, &url).json(&body))
            .await?;
        Ok(())
    }
}
