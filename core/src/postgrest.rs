use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Map, Value};

use crate::config::RemoteConfig;
use crate::error::StorageError;
use crate::remote::{Filter, Query, TableClient, TableResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`TableClient`] speaking the PostgREST protocol, as exposed by Supabase.
pub struct PostgrestClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl PostgrestClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, StorageError> {
        let http = Client::builder()
            .user_agent(format!("glycolog/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&self, request: RequestBuilder) -> TableResponse {
        let response = match request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
        {
            Ok(response) => response,
            Err(err) => return TableResponse::failed(0, err.to_string()),
        };

        let status = response.status();
        let code = status.as_u16();
        let body = match response.text() {
            Ok(body) => body,
            Err(err) => return TableResponse::failed(code, format!("failed to read response: {err}")),
        };
        if !status.is_success() {
            return TableResponse::failed(code, error_message(&body, code));
        }
        if body.trim().is_empty() {
            return TableResponse::ok(code, Vec::new());
        }
        match serde_json::from_str(&body) {
            Ok(Value::Array(rows)) => TableResponse::ok(code, rows),
            Ok(row @ Value::Object(_)) => TableResponse::ok(code, vec![row]),
            Ok(_) => TableResponse::failed(code, "response was not a list of rows"),
            Err(err) => TableResponse::failed(code, format!("failed to parse response: {err}")),
        }
    }

    fn write(&self, request: RequestBuilder) -> TableResponse {
        self.send(request.header("Prefer", "return=representation"))
    }
}

/// PostgREST errors carry a `message`; anything else is passed through as-is.
fn error_message(body: &str, status: u16) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("message")).and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None if body.trim().is_empty() => format!("request failed with status {status}"),
        None => body.trim().to_string(),
    }
}

fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{value}")),
    }
}

fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(query.filter.as_ref().map(filter_param));
    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| {
                let direction = if o.descending { "desc" } else { "asc" };
                format!("{}.{direction}", o.column)
            })
            .collect();
        params.push(("order".to_string(), order.join(",")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    params
}

impl TableClient for PostgrestClient {
    fn insert(&self, row: &Map<String, Value>) -> TableResponse {
        self.write(self.http.post(&self.endpoint).json(row))
    }

    fn select(&self, query: &Query) -> TableResponse {
        self.send(self.http.get(&self.endpoint).query(&query_params(query)))
    }

    fn update(&self, filter: &Filter, changes: &Map<String, Value>) -> TableResponse {
        self.write(
            self.http
                .patch(&self.endpoint)
                .query(&[filter_param(filter)])
                .json(changes),
        )
    }

    fn delete(&self, filter: &Filter) -> TableResponse {
        self.write(self.http.delete(&self.endpoint).query(&[filter_param(filter)]))
    }
}
