use crate::config::{Config, PropertyNames};
use crate::errors::AppError;
use crate::models::{present, ColumnKind, FieldValue, InputField, Lead, OutputField};
use crate::retry::RetryPolicy;
use crate::store::{LeadFilter, RecordStore, WriteReport};
use chrono::NaiveDate;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const NOTION_VERSION: &str = "2022-06-28";
/// Notion rejects rich text segments longer than this.
const RICH_TEXT_CHUNK_CHARS: usize = 2000;
const MAX_RICH_TEXT_SEGMENTS: usize = 100;
const PAGE_SIZE: usize = 100;

/// Column name → Notion property type (`"number"`, `"rich_text"`, ...).
type Schema = HashMap<String, String>;

/// Client for a single Notion database holding the leads.
///
/// The database schema is fetched once and cached; write-back formats every
/// value according to the type of its target column.
pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    database_id: String,
    properties: PropertyNames,
    retry: RetryPolicy,
    schema: Mutex<Option<Arc<Schema>>>,
}

impl NotionClient {
    /// Creates a new `NotionClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Notion API base URL, without trailing slash.
    /// * `api_key` - Integration secret.
    /// * `database_id` - ID of the leads database.
    /// * `properties` - Logical field to column name mapping.
    /// * `retry` - Backoff policy for 429/5xx answers.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        base_url: String,
        api_key: String,
        database_id: String,
        properties: PropertyNames,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ExternalApi(format!("Failed to create Notion client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            database_id,
            properties,
            retry,
            schema: Mutex::new(None),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let (api_key, database_id) = config.notion_credentials()?;
        Self::new(
            config.notion_base_url.clone(),
            api_key.to_string(),
            database_id.to_string(),
            config.properties.clone(),
            config.retry,
            config.notion_timeout,
        )
    }

    /// Re-reads the database schema, proving the key can see the database.
    /// Returns the number of columns found.
    pub async fn validate_database(&self) -> Result<usize, AppError> {
        self.invalidate_schema().await;
        let schema = self.schema().await?;
        tracing::info!("Notion access check OK: {} column(s)", schema.len());
        Ok(schema.len())
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                AppError::TransientNetwork(format!("Notion request failed: {}", e))
            } else {
                AppError::ExternalApi(format!("Notion request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Failed to parse Notion response: {}", e)))
    }

    async fn send(
        &self,
        label: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        self.retry
            .run(label, AppError::is_transient, || {
                self.send_once(method.clone(), url, body)
            })
            .await
    }

    /// Cached database schema. The first call also verifies access.
    async fn schema(&self) -> Result<Arc<Schema>, AppError> {
        let mut cached = self.schema.lock().await;
        if let Some(schema) = cached.as_ref() {
            return Ok(Arc::clone(schema));
        }

        let url = format!("{}/v1/databases/{}", self.base_url, self.database_id);
        tracing::info!("Retrieving Notion database schema: {}", self.database_id);
        let data = self
            .send("Notion database retrieve", Method::GET, &url, None)
            .await?;

        let schema = Arc::new(parse_schema(&data));
        let missing: Vec<&str> = InputField::ALL
            .iter()
            .map(|f| self.properties.input(*f))
            .filter(|column| !schema.contains_key(*column))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "Database is missing expected input columns: {}. Affected lead attributes will be treated as absent.",
                missing.join(", ")
            );
        }

        *cached = Some(Arc::clone(&schema));
        Ok(schema)
    }

    async fn invalidate_schema(&self) {
        *self.schema.lock().await = None;
    }

    fn status_filter(&self, filter: &LeadFilter, schema: &Schema) -> Option<Value> {
        let status = filter.status.as_ref()?;
        let column = self.properties.input(InputField::Status);
        let kind = schema.get(column)?;
        if !matches!(kind.as_str(), "select" | "status" | "rich_text") {
            return None;
        }
        let mut condition = json!({ "property": column });
        condition[kind.as_str()] = json!({ "equals": status });
        Some(condition)
    }
}

impl RecordStore for NotionClient {
    async fn query_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        let schema = self.schema().await?;
        let url = format!("{}/v1/databases/{}/query", self.base_url, self.database_id);
        let limit = filter.limit.unwrap_or(usize::MAX);

        let mut leads = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages_fetched = 0;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(ref start) = cursor {
                body["start_cursor"] = json!(start);
            }
            if let Some(status_filter) = self.status_filter(filter, &schema) {
                body["filter"] = status_filter;
            }

            let data = self
                .send("Notion database query", Method::POST, &url, Some(&body))
                .await?;
            pages_fetched += 1;

            let results = data
                .get("results")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for page in results {
                let Some(lead) = lead_from_page(page, &self.properties) else {
                    tracing::warn!("Skipping Notion result without a page id");
                    continue;
                };
                if !filter.matches(&lead) {
                    continue;
                }
                leads.push(lead);
                if leads.len() >= limit {
                    tracing::info!("Fetched {} lead(s) (limit reached)", leads.len());
                    return Ok(leads);
                }
            }

            let has_more = data.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            cursor = data
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                break;
            }
        }

        tracing::info!(
            "Fetched {} lead(s) from Notion in {} page(s)",
            leads.len(),
            pages_fetched
        );
        Ok(leads)
    }

    async fn write_properties(
        &self,
        lead_id: &str,
        values: &[(OutputField, FieldValue)],
    ) -> Result<WriteReport, AppError> {
        let schema = self.schema().await?;
        let mut report = WriteReport::default();
        let mut properties = Map::new();

        for (field, value) in values {
            let column = self.properties.output(*field);
            let Some(kind) = schema.get(column) else {
                report.skipped_columns.push(column.to_string());
                continue;
            };
            match format_property(kind, value) {
                Some(formatted) => {
                    properties.insert(column.to_string(), formatted);
                    report.written.push(column.to_string());
                }
                None => {
                    tracing::warn!(
                        "Column '{}' has type '{}', which cannot hold {}",
                        column,
                        kind,
                        field.key()
                    );
                    report.skipped_columns.push(column.to_string());
                }
            }
        }

        if properties.is_empty() {
            tracing::warn!("Nothing to write for page {}", lead_id);
            return Ok(report);
        }

        let url = format!("{}/v1/pages/{}", self.base_url, lead_id);
        let body = json!({ "properties": properties });
        self.send("Notion page update", Method::PATCH, &url, Some(&body))
            .await?;

        tracing::debug!("Wrote {} properties to page {}", report.written.len(), lead_id);
        Ok(report)
    }

    async fn ensure_schema_columns(&self) -> Result<Vec<String>, AppError> {
        let schema = self.schema().await?;

        let mut missing = Map::new();
        for field in OutputField::ALL {
            let column = self.properties.output(*field);
            if !schema.contains_key(column) {
                missing.insert(column.to_string(), column_definition(field.column_kind()));
            }
        }

        if missing.is_empty() {
            tracing::info!("All output columns already exist");
            return Ok(Vec::new());
        }

        let created: Vec<String> = missing.keys().cloned().collect();
        tracing::info!("Creating {} output column(s): {}", created.len(), created.join(", "));

        let url = format!("{}/v1/databases/{}", self.base_url, self.database_id);
        let body = json!({ "properties": missing });
        self.send("Notion database update", Method::PATCH, &url, Some(&body))
            .await?;
        self.invalidate_schema().await;

        Ok(created)
    }
}

fn classify_status(status: StatusCode, body: &str) -> AppError {
    match status.as_u16() {
        401 | 403 => AppError::Auth(format!(
            "Notion returned {}: {}. Check NOTION_API_KEY and that the database is shared \
             with the integration (https://www.notion.so/my-integrations)",
            status, body
        )),
        404 => AppError::Configuration(format!(
            "Notion returned {}: {}. Double-check NOTION_DATABASE_ID and share the database \
             with your integration ('...' menu, 'Connections')",
            status, body
        )),
        429 | 500 | 502 | 503 | 504 => {
            AppError::TransientNetwork(format!("Notion returned {}: {}", status, body))
        }
        _ => AppError::ExternalApi(format!("Notion returned {}: {}", status, body)),
    }
}

fn parse_schema(database: &Value) -> Schema {
    database
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter_map(|(name, prop)| {
                    let kind = prop.get("type")?.as_str()?;
                    Some((name.clone(), kind.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Builds a [`Lead`] from a Notion page object. `None` without a page id.
pub fn lead_from_page(page: &Value, names: &PropertyNames) -> Option<Lead> {
    let id = page.get("id")?.as_str()?;
    let props = page.get("properties");
    let prop = |field: InputField| props.and_then(|p| p.get(names.input(field)));
    let text = |field: InputField| present(prop(field).and_then(property_text));

    Some(Lead {
        id: id.to_string(),
        company: text(InputField::Company).unwrap_or_default(),
        website: text(InputField::Website),
        notes: text(InputField::Notes),
        last_contacted: prop(InputField::LastContacted).and_then(property_date),
        status: text(InputField::Status),
    })
}

/// Plain text of any readable property type.
fn property_text(prop: &Value) -> Option<String> {
    let kind = prop.get("type")?.as_str()?;
    let value = prop.get(kind)?;
    match kind {
        "title" | "rich_text" => Some(
            value
                .as_array()?
                .iter()
                .filter_map(|segment| {
                    segment
                        .get("plain_text")
                        .or_else(|| segment.get("text").and_then(|t| t.get("content")))
                        .and_then(Value::as_str)
                })
                .collect::<String>(),
        ),
        "url" | "email" | "phone_number" => value.as_str().map(str::to_string),
        "select" | "status" => value.get("name")?.as_str().map(str::to_string),
        "number" => value.as_f64().map(|n| n.to_string()),
        "date" => value.get("start")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Date from a date column, or from a text column holding `YYYY-MM-DD`.
fn property_date(prop: &Value) -> Option<NaiveDate> {
    let raw = property_text(prop)?;
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let segments: Vec<Value> = chars
        .chunks(RICH_TEXT_CHUNK_CHARS)
        .take(MAX_RICH_TEXT_SEGMENTS)
        .map(|chunk| {
            json!({
                "type": "text",
                "text": { "content": chunk.iter().collect::<String>() }
            })
        })
        .collect();
    Value::Array(segments)
}

/// Formats a value for a column of the given Notion type.
///
/// `None` when the column type cannot hold the value.
fn format_property(kind: &str, value: &FieldValue) -> Option<Value> {
    match kind {
        "number" => match value {
            FieldValue::Number(n) => Some(json!({ "number": n })),
            other => other
                .as_text()
                .trim()
                .parse::<f64>()
                .ok()
                .map(|n| json!({ "number": n })),
        },
        "rich_text" => Some(json!({ "rich_text": rich_text(&value.as_text()) })),
        "title" => Some(json!({ "title": rich_text(&value.as_text()) })),
        "select" => {
            let name = value.as_text();
            if name.is_empty() {
                Some(json!({ "select": null }))
            } else {
                Some(json!({ "select": { "name": name } }))
            }
        }
        "multi_select" => {
            let names = match value {
                FieldValue::List(items) => items.clone(),
                other => vec![other.as_text()],
            };
            let options: Vec<Value> = names
                .into_iter()
                .filter(|n| !n.is_empty())
                .map(|n| json!({ "name": n }))
                .collect();
            Some(json!({ "multi_select": options }))
        }
        "checkbox" => match value {
            FieldValue::Checkbox(b) => Some(json!({ "checkbox": b })),
            _ => None,
        },
        "url" => Some(json!({ "url": value.as_text() })),
        _ => None,
    }
}

fn column_definition(kind: ColumnKind) -> Value {
    match kind {
        ColumnKind::Number => json!({ "number": { "format": "number" } }),
        ColumnKind::RichText => json!({ "rich_text": {} }),
        ColumnKind::Checkbox => json!({ "checkbox": {} }),
        ColumnKind::Select(options) => {
            let options: Vec<Value> = options.iter().map(|o| json!({ "name": o })).collect();
            json!({ "select": { "options": options } })
        }
    }
}
