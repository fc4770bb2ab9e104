//! Notion API record store for the cycle tracker.
//!
//! Provides a [`RecordStore`] over one Notion database:
//! - Paginated, sorted database queries with pushed-down filters
//! - Page creation and partial property updates
//! - Decoding of Notion property objects into typed [`PropertyValue`]s

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ct_core::{
    Author, DateValue, Fields, Filter, PropertyValue, Record, RecordId, RecordStore, StoreError,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const NOTION_API_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// Notion client errors.
#[derive(Debug, Error)]
pub enum NotionError {
    /// The provided integration token was invalid.
    #[error("invalid Notion token: {reason}")]
    InvalidToken { reason: &'static str },
    /// The database ID was empty.
    #[error("Notion database ID cannot be empty")]
    MissingDatabaseId,
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("Notion API error ({code}): {message}")]
    Api { code: String, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<NotionError> for StoreError {
    fn from(err: NotionError) -> Self {
        match err {
            NotionError::Api { code, message } if code == "object_not_found" => {
                Self::NotFound { id: message }
            }
            other => Self::backend(other),
        }
    }
}

/// Notion API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with the given integration token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(token: impl Into<String>) -> Result<Self, NotionError> {
        let token = token.into();
        if token.is_empty() {
            return Err(NotionError::InvalidToken {
                reason: "token cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(NotionError::InvalidToken {
                reason: "token cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(NotionError::ClientBuild)?;

        Ok(Self {
            http,
            token,
            base_url: NOTION_API_URL.to_string(),
        })
    }

    /// Points the client at another API root, such as a local proxy.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Queries every page of a database, following pagination cursors.
    pub async fn query_database(
        &self,
        database_id: &str,
        filter: Option<&Filter>,
        sort_by: Option<&str>,
    ) -> Result<Vec<Page>, NotionError> {
        let url = format!("{}/databases/{database_id}/query", self.base_url);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let body = query_body(filter, sort_by, cursor.as_deref());
            let response: QueryResponse = self.send(self.http.post(&url).json(&body)).await?;
            pages.extend(response.results);
            tracing::debug!(pages = pages.len(), "fetched database page batch");
            match response.next_cursor.filter(|_| response.has_more) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(pages)
    }

    /// Creates a page in a database.
    pub async fn create_page(
        &self,
        database_id: &str,
        fields: &Fields,
    ) -> Result<Page, NotionError> {
        let url = format!("{}/pages", self.base_url);
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": encode_fields(fields),
        });
        self.send(self.http.post(&url).json(&body)).await
    }

    /// Updates the listed properties of a page.
    pub async fn update_page(&self, page_id: &str, fields: &Fields) -> Result<(), NotionError> {
        let url = format!("{}/pages/{page_id}", self.base_url);
        let body = json!({ "properties": encode_fields(fields) });
        let _: Value = self.send(self.http.patch(&url).json(&body)).await?;
        Ok(())
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, NotionError> {
        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| NotionError::Api {
                code: status.as_u16().to_string(),
                message: body,
            }));
        }
        serde_json::from_str(&body).map_err(|err| NotionError::InvalidResponse(err.to_string()))
    }
}

/// Blocking [`RecordStore`] over one Notion database.
///
/// Owns a current-thread runtime and blocks on each API call, so it must not
/// be used from inside another async runtime.
pub struct NotionStore {
    client: Client,
    database_id: String,
    runtime: tokio::runtime::Runtime,
}

impl fmt::Debug for NotionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionStore")
            .field("client", &self.client)
            .field("database_id", &self.database_id)
            .finish_non_exhaustive()
    }
}

impl NotionStore {
    pub fn new(client: Client, database_id: impl Into<String>) -> Result<Self, NotionError> {
        let database_id = database_id.into();
        if database_id.trim().is_empty() {
            return Err(NotionError::MissingDatabaseId);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(NotionError::Runtime)?;
        Ok(Self {
            client,
            database_id,
            runtime,
        })
    }

    fn pages_to_records(pages: Vec<Page>) -> Result<Vec<Record>, StoreError> {
        pages.into_iter().map(Page::into_record).collect()
    }
}

impl RecordStore for NotionStore {
    fn query_all(&self, sort_by: &str) -> Result<Vec<Record>, StoreError> {
        let pages = self.runtime.block_on(self.client.query_database(
            &self.database_id,
            None,
            Some(sort_by),
        ))?;
        Self::pages_to_records(pages)
    }

    fn query_filtered(&self, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let pages = self.runtime.block_on(self.client.query_database(
            &self.database_id,
            Some(filter),
            None,
        ))?;
        Self::pages_to_records(pages)
    }

    fn create_record(&self, fields: &Fields) -> Result<Record, StoreError> {
        let page = self
            .runtime
            .block_on(self.client.create_page(&self.database_id, fields))?;
        page.into_record()
    }

    fn update_record(&self, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        self.runtime
            .block_on(self.client.update_page(id.as_str(), fields))?;
        Ok(())
    }
}

/// A database page as returned by the API.
#[derive(Debug, Deserialize)]
pub struct Page {
    pub id: String,
    pub created_time: DateTime<Utc>,
    pub last_edited_time: DateTime<Utc>,
    created_by: PartialUser,
    properties: BTreeMap<String, WireProperty>,
}

#[derive(Debug, Deserialize)]
struct PartialUser {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl Page {
    /// Converts to a typed record. Property types the engine does not read are dropped.
    pub fn into_record(self) -> Result<Record, StoreError> {
        let id = RecordId::new(self.id.clone()).map_err(|e| StoreError::Malformed {
            id: self.id.clone(),
            message: e.to_string(),
        })?;
        // Partial user objects omit the type; only integrations are marked "bot".
        let created_by = match self.created_by.kind.as_deref() {
            Some("bot") => Author::Automation,
            _ => Author::Person,
        };
        let properties = self
            .properties
            .into_iter()
            .filter_map(|(name, prop)| prop.into_value().map(|v| (name, v)))
            .collect();
        Ok(Record {
            id,
            properties,
            created_by,
            created_at: self.created_time,
            last_edited_at: self.last_edited_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Page>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireProperty {
    Title { title: Vec<RichText> },
    RichText { rich_text: Vec<RichText> },
    Date { date: Option<WireDate> },
    Select { select: Option<WireSelect> },
    Number { number: Option<f64> },
    Checkbox { checkbox: bool },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct RichText {
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct WireDate {
    start: String,
}

#[derive(Debug, Deserialize)]
struct WireSelect {
    name: String,
}

impl WireProperty {
    fn into_value(self) -> Option<PropertyValue> {
        let plain = |texts: Vec<RichText>| -> String {
            texts.into_iter().map(|t| t.plain_text).collect()
        };
        Some(match self {
            Self::Title { title } => PropertyValue::Title(plain(title)),
            Self::RichText { rich_text } => PropertyValue::Text(plain(rich_text)),
            // An unparseable date reads as unset, like a missing one.
            Self::Date { date } => {
                PropertyValue::Date(date.and_then(|d| DateValue::parse(&d.start)))
            }
            Self::Select { select } => PropertyValue::Select(select.map(|s| s.name)),
            Self::Number { number } => PropertyValue::Number(number),
            Self::Checkbox { checkbox } => PropertyValue::Checkbox(checkbox),
            Self::Unsupported => return None,
        })
    }
}

fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": content } }])
}

fn encode_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(s) => json!({ "title": rich_text(s) }),
        PropertyValue::Text(s) => json!({ "rich_text": rich_text(s) }),
        PropertyValue::Date(date) => match date {
            Some(d) => json!({ "date": { "start": d.to_string() } }),
            None => json!({ "date": null }),
        },
        PropertyValue::Select(name) => match name {
            Some(name) => json!({ "select": { "name": name } }),
            None => json!({ "select": null }),
        },
        PropertyValue::Number(n) => json!({ "number": n }),
        PropertyValue::Checkbox(b) => json!({ "checkbox": b }),
    }
}

/// Encodes fields as a Notion `properties` object.
fn encode_fields(fields: &Fields) -> Value {
    let map: serde_json::Map<String, Value> = fields
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect();
    Value::Object(map)
}

fn encode_filter(filter: &Filter) -> Value {
    match filter {
        Filter::TitleEquals { property, value } => {
            json!({ "property": property, "title": { "equals": value } })
        }
        Filter::SelectEquals { property, value } => {
            json!({ "property": property, "select": { "equals": value } })
        }
        Filter::DateEquals { property, date } => json!({
            "property": property,
            "date": { "equals": date.format("%Y-%m-%d").to_string() },
        }),
        Filter::And(filters) => {
            json!({ "and": filters.iter().map(encode_filter).collect::<Vec<_>>() })
        }
    }
}

fn query_body(filter: Option<&Filter>, sort_by: Option<&str>, cursor: Option<&str>) -> Value {
    let mut body = json!({ "page_size": PAGE_SIZE });
    if let Some(filter) = filter {
        body["filter"] = encode_filter(filter);
    }
    if let Some(property) = sort_by {
        body["sorts"] = json!([{ "property": property, "direction": "ascending" }]);
    }
    if let Some(cursor) = cursor {
        body["start_cursor"] = json!(cursor);
    }
    body
}

fn parse_api_error(body: &str) -> Option<NotionError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        code: String,
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| NotionError::Api {
            code: payload.code,
            message: payload.message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const PAGE: &str = r#"{
        "object": "page",
        "id": "59833787-2cf9-4fdf-8782-e53db20768a5",
        "created_time": "2024-01-01T00:00:00.000Z",
        "last_edited_time": "2024-01-02T03:04:00.000Z",
        "created_by": { "object": "user", "id": "ee5f0f84" },
        "properties": {
            "Title": { "id": "title", "type": "title", "title": [
                { "type": "text", "plain_text": "Start / ", "text": { "content": "Start / " } },
                { "type": "text", "plain_text": "01/01", "text": { "content": "01/01" } }
            ] },
            "Kind": { "id": "a", "type": "select", "select": { "id": "x", "name": "Start", "color": "red" } },
            "Date": { "id": "b", "type": "date", "date": { "start": "2024-01-01", "end": null, "time_zone": null } },
            "Cycle Days": { "id": "c", "type": "number", "number": 27 },
            "Next Period": { "id": "d", "type": "date", "date": null },
            "Input Error": { "id": "e", "type": "checkbox", "checkbox": false },
            "Note": { "id": "f", "type": "rich_text", "rich_text": [] },
            "Edited": { "id": "g", "type": "last_edited_time", "last_edited_time": "2024-01-02T03:04:00.000Z" }
        }
    }"#;

    #[test]
    fn client_rejects_empty_token() {
        assert!(matches!(
            Client::new(""),
            Err(NotionError::InvalidToken { .. })
        ));
        assert!(matches!(
            Client::new("   "),
            Err(NotionError::InvalidToken { .. })
        ));
    }

    #[test]
    fn client_debug_redacts_token() {
        let client = Client::new("secret_token").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret_token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn store_requires_database_id() {
        let client = Client::new("secret_token").unwrap();
        assert!(matches!(
            NotionStore::new(client, " "),
            Err(NotionError::MissingDatabaseId)
        ));
    }

    #[test]
    fn page_decodes_into_typed_record() {
        let page: Page = serde_json::from_str(PAGE).unwrap();
        let record = page.into_record().unwrap();

        assert_eq!(record.created_by, Author::Person);
        assert_eq!(record.title("Title").unwrap(), Some("Start / 01/01"));
        assert_eq!(record.select("Kind").unwrap(), Some("Start"));
        assert_eq!(
            record.date("Date").unwrap(),
            Some(DateValue::Day(day(2024, 1, 1)))
        );
        assert_eq!(record.number("Cycle Days").unwrap(), Some(27.0));
        assert_eq!(record.date("Next Period").unwrap(), None);
        assert!(!record.checkbox("Input Error").unwrap());
        assert_eq!(record.title("Note").unwrap(), None);
        assert!(!record.properties.contains_key("Edited"));
    }

    #[test]
    fn bot_pages_are_automation() {
        let json = PAGE.replace(
            r#""created_by": { "object": "user", "id": "ee5f0f84" }"#,
            r#""created_by": { "object": "user", "id": "ee5f0f84", "type": "bot" }"#,
        );
        let page: Page = serde_json::from_str(&json).unwrap();
        assert_eq!(page.into_record().unwrap().created_by, Author::Automation);
    }

    #[test]
    fn fields_encode_as_property_objects() {
        let fields = Fields::new()
            .title("Title", "End / 01/05")
            .day("Next Period", None)
            .day("Date", Some(day(2024, 1, 5)))
            .select("Kind", Some("End"))
            .count("Period Days", 5)
            .checkbox("Latest End", true);

        assert_eq!(
            encode_fields(&fields),
            json!({
                "Title": { "title": [{ "type": "text", "text": { "content": "End / 01/05" } }] },
                "Next Period": { "date": null },
                "Date": { "date": { "start": "2024-01-05" } },
                "Kind": { "select": { "name": "End" } },
                "Period Days": { "number": 5.0 },
                "Latest End": { "checkbox": true },
            })
        );
    }

    #[test]
    fn query_body_carries_filter_sort_and_cursor() {
        let filter = Filter::And(vec![
            Filter::SelectEquals {
                property: "Kind".to_string(),
                value: "Planned Period".to_string(),
            },
            Filter::DateEquals {
                property: "Date".to_string(),
                date: day(2024, 2, 22),
            },
        ]);
        assert_eq!(
            query_body(Some(&filter), None, Some("cursor-1")),
            json!({
                "page_size": 100,
                "start_cursor": "cursor-1",
                "filter": { "and": [
                    { "property": "Kind", "select": { "equals": "Planned Period" } },
                    { "property": "Date", "date": { "equals": "2024-02-22" } },
                ] },
            })
        );
        assert_eq!(
            query_body(None, Some("Date"), None),
            json!({
                "page_size": 100,
                "sorts": [{ "property": "Date", "direction": "ascending" }],
            })
        );
    }

    #[test]
    fn api_errors_are_parsed() {
        let body = r#"{"object":"error","status":404,"code":"object_not_found","message":"Could not find page"}"#;
        let err = parse_api_error(body).unwrap();
        assert!(matches!(&err, NotionError::Api { code, .. } if code == "object_not_found"));
        assert!(matches!(
            StoreError::from(err),
            StoreError::NotFound { .. }
        ));
        assert!(parse_api_error("<html>").is_none());
    }
}
