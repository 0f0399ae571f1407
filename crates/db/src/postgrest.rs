//! Typed client for the PostgREST-style row API of the hosted backend.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("json error: {0}")]
    Serde(String),
    #[error("malformed count response: {0}")]
    Count(String),
    #[error("missing configuration: {0} environment variable not set")]
    MissingConfig(&'static str),
}

impl StoreError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Client for the remote row store's REST surface.
///
/// Queries are expressed through [`QueryBuilder`]; the store itself (its
/// schema, auth rules, RPC functions) is an external collaborator.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: Client,
    base_url: String,
    service_key: String,
}

impl PostgrestClient {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("infra360/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    /// Create a client from `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY`.
    pub fn from_env() -> Result<Self, StoreError> {
        let base_url =
            std::env::var("SUPABASE_URL").map_err(|_| StoreError::MissingConfig("SUPABASE_URL"))?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| StoreError::MissingConfig("SUPABASE_SERVICE_ROLE_KEY"))?;
        Self::new(&base_url, &service_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// Start a query against a table.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder {
            client: self.clone(),
            table: table.to_string(),
            params: Vec::new(),
        }
    }

    /// Invoke a remote procedure (used by the maintenance fixes to run SQL).
    pub async fn rpc(
        &self,
        function: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, StoreError> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let response = self
            .authed(self.http.post(&url))
            .json(&params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Serde(e.to_string()))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

/// Builder for a single table query; filters accumulate as PostgREST
/// query-string operators.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    client: PostgrestClient,
    table: String,
    params: Vec<(String, String)>,
}

impl QueryBuilder {
    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("gte.{}", value.to_string())));
        self
    }

    pub fn lte(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("lte.{}", value.to_string())));
        self
    }

    pub fn lt(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("lt.{}", value.to_string())));
        self
    }

    /// Order by a column, descending when `descending` is set.
    pub fn order(mut self, column: &str, descending: bool) -> Self {
        let direction = if descending { "desc" } else { "asc" };
        self.params
            .push(("order".to_string(), format!("{column}.{direction}")));
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.params.push(("limit".to_string(), count.to_string()));
        self
    }

    /// Restrict to rows `from..=to` of the ordered result set.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.params.push(("offset".to_string(), from.to_string()));
        self.params
            .push(("limit".to_string(), (to - from + 1).to_string()));
        self
    }

    /// Execute the query and deserialize the returned rows.
    ///
    /// Transient failures are retried with exponential backoff before the
    /// error is surfaced.
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, StoreError> {
        let rows = (|| async { self.execute().await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_delay(Duration::from_secs(5))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(StoreError::should_retry)
            .notify(|e, dur| {
                warn!(
                    "row store query failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;
        Ok(rows)
    }

    async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        let response = self
            .client
            .authed(
                self.client
                    .http
                    .request(Method::GET, self.client.table_url(&self.table))
                    .query(&self.params),
            )
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match response.status() {
            s if s.is_success() => response
                .json::<Vec<T>>()
                .await
                .map_err(|e| StoreError::Serde(e.to_string())),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Http {
                    status: s.as_u16(),
                    body,
                })
            }
        }
    }

    /// Exact row count for the current filters (HEAD request; no rows are
    /// transferred).
    pub async fn count(self) -> Result<u64, StoreError> {
        let response = self
            .client
            .authed(
                self.client
                    .http
                    .request(Method::HEAD, self.client.table_url(&self.table))
                    .query(&self.params),
            )
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::PARTIAL_CONTENT {
            return Err(StoreError::Http {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Count("missing content-range header".to_string()))?;
        parse_content_range(content_range)
    }

    /// Insert a row, discarding the representation.
    pub async fn insert<T: Serialize>(self, row: &T) -> Result<(), StoreError> {
        self.write(Method::POST, row, "return=minimal").await?;
        Ok(())
    }

    /// Insert a row and deserialize the stored representation.
    pub async fn insert_returning<T: Serialize, R: DeserializeOwned>(
        self,
        row: &T,
    ) -> Result<R, StoreError> {
        let body = self.write(Method::POST, row, "return=representation").await?;
        let mut rows: Vec<R> =
            serde_json::from_str(&body).map_err(|e| StoreError::Serde(e.to_string()))?;
        rows.pop()
            .ok_or_else(|| StoreError::Serde("insert returned no rows".to_string()))
    }

    /// Patch the rows matched by the current filters.
    pub async fn update<T: Serialize>(self, patch: &T) -> Result<(), StoreError> {
        self.write(Method::PATCH, patch, "return=minimal").await?;
        Ok(())
    }

    /// Patch the matched rows and return their stored representations.
    pub async fn update_returning<T: Serialize, R: DeserializeOwned>(
        self,
        patch: &T,
    ) -> Result<Vec<R>, StoreError> {
        let body = self
            .write(Method::PATCH, patch, "return=representation")
            .await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Serde(e.to_string()))
    }

    async fn write<T: Serialize>(
        &self,
        method: Method,
        body: &T,
        prefer: &str,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .authed(
                self.client
                    .http
                    .request(method, self.client.table_url(&self.table))
                    .query(&self.params),
            )
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(e.to_string())
    }
}

/// Parse the total out of a `Content-Range` header (`0-999/2500` or `*/2500`).
fn parse_content_range(value: &str) -> Result<u64, StoreError> {
    value
        .rsplit('/')
        .next()
        .and_then(|total| total.parse::<u64>().ok())
        .ok_or_else(|| StoreError::Count(value.to_string()))
}
