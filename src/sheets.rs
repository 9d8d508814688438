#![forbid(unsafe_code)]

//! Flattens enriched link records into spreadsheet rows and writes them to a
//! Google Sheets range in one `values.update` call.

use crate::error::PublishError;
use crate::models::{EnrichedLinkRecord, SpreadsheetRow};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::{debug, info};
use ureq::Agent;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_RANGE: &str = "Sheet1!A2:F";

/// Lets the sheet parse numbers and dates instead of storing literal text.
const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// How the publisher authenticates against the Sheets API.
#[derive(Clone, PartialEq, Eq)]
pub enum SheetsCredentials {
    /// A ready-to-use OAuth bearer token.
    AccessToken(String),
    /// Installed-app credentials exchanged for an access token once per run.
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

impl fmt::Debug for SheetsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Self::RefreshToken { client_id, .. } => f
                .debug_struct("RefreshToken")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Returns a bearer token, calling the OAuth token endpoint when only a
/// refresh token is configured.
pub fn obtain_access_token(
    agent: &Agent,
    token_url: &str,
    credentials: &SheetsCredentials,
) -> Result<String, PublishError> {
    let (client_id, client_secret, refresh_token) = match credentials {
        SheetsCredentials::AccessToken(token) => return Ok(token.clone()),
        SheetsCredentials::RefreshToken {
            client_id,
            client_secret,
            refresh_token,
        } => (client_id, client_secret, refresh_token),
    };

    let response = agent.post(token_url).send_form(&[
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh_token),
    ]);
    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            return Err(PublishError::Token(format!("status {status}: {body}")));
        }
        Err(err) => return Err(PublishError::Token(err.to_string())),
    };
    let token: TokenResponse = response
        .into_json()
        .map_err(|err| PublishError::Token(err.to_string()))?;
    Ok(token.access_token)
}

/// Spreadsheet and A1 range that receive the rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    pub range: String,
}

/// The interesting part of a `values.update` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: u64,
    #[serde(default)]
    pub updated_cells: u64,
}

/// Bulk range write. Success or failure of the single call is the only
/// outcome; partial writes are not distinguished.
pub trait SheetsApi {
    fn update_values(
        &self,
        target: &SheetTarget,
        rows: &[SpreadsheetRow],
    ) -> Result<UpdateSummary, PublishError>;
}

/// [`SheetsApi`] against the Sheets v4 REST API.
pub struct UreqSheetsClient {
    agent: Agent,
    base: String,
    access_token: String,
}

impl UreqSheetsClient {
    pub fn new(agent: Agent, base: &str, access_token: String) -> Self {
        Self {
            agent,
            base: base.to_string(),
            access_token,
        }
    }

    fn values_url(&self, target: &SheetTarget) -> Result<Url, PublishError> {
        let mut url =
            Url::parse(&self.base).map_err(|err| PublishError::Endpoint(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| PublishError::Endpoint(self.base.clone()))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                target.spreadsheet_id.as_str(),
                "values",
                target.range.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT_OPTION);
        Ok(url)
    }
}

impl SheetsApi for UreqSheetsClient {
    fn update_values(
        &self,
        target: &SheetTarget,
        rows: &[SpreadsheetRow],
    ) -> Result<UpdateSummary, PublishError> {
        let url = self.values_url(target)?;
        debug!(%url, rows = rows.len(), "sheets values.update");
        let body = json!({
            "range": target.range,
            "majorDimension": "ROWS",
            "values": rows,
        });

        let response = self
            .agent
            .put(url.as_str())
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .send_json(body);
        match response {
            Ok(response) => response
                .into_json::<UpdateSummary>()
                .map_err(|err| PublishError::Transport(err.to_string())),
            Err(ureq::Error::Status(status, response)) => Err(PublishError::Rejected {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(err) => Err(PublishError::Transport(err.to_string())),
        }
    }
}

/// One row per record, in record order, optionally preceded by the column
/// names.
pub fn build_rows(records: &[EnrichedLinkRecord], header: bool) -> Vec<SpreadsheetRow> {
    let mut rows = Vec::with_capacity(records.len() + usize::from(header));
    if header {
        rows.push(SpreadsheetRow::header());
    }
    rows.extend(records.iter().map(SpreadsheetRow::from));
    rows
}

pub fn publish(
    api: &impl SheetsApi,
    target: &SheetTarget,
    rows: &[SpreadsheetRow],
) -> Result<UpdateSummary, PublishError> {
    let summary = api.update_values(target, rows)?;
    info!(
        range = summary.updated_range.as_deref().unwrap_or(target.range.as_str()),
        rows = summary.updated_rows,
        cells = summary.updated_cells,
        "spreadsheet updated"
    );
    Ok(summary)
}
