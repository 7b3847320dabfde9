//! Upstream pipeline client: the HTTP collaborator that actually enumerates
//! and executes tools. This core is a thin protocol adapter in front of it,
//! built on a fixed base URL, a bearer token header, and a typed error enum
//! distinguishing transport failures from non-2xx bodies.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Map, Value, json};
use url::Url;

use crate::types::PipelineToolDef;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub url: String,
    pub bearer_token: String,
    pub timeout_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pipeline returned non-success status {status}: {body}")]
    NonSuccess { status: u16, body: String },

    #[error("invalid pipeline response: {0}")]
    InvalidResponse(String),
}

/// Thin HTTP adapter over the upstream pipeline endpoint. Tool discovery and
/// execution are both single POSTs to the same URL; the request shape is the
/// only thing that differs (raw params vs. arguments + `sl_tool_name`).
#[derive(Clone)]
pub struct PipelineClient {
    url: Url,
    bearer_token: String,
    http: reqwest::Client,
}

impl PipelineClient {
    pub fn new(cfg: &PipelineConfig) -> anyhow::Result<Self> {
        let url = Url::parse(&cfg.url)
            .map_err(|e| anyhow::anyhow!("Invalid pipeline url '{}': {e}", cfg.url))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .redirect(reqwest::redirect::Policy::default())
            .build()?;

        Ok(Self {
            url,
            bearer_token: cfg.bearer_token.clone(),
            http,
        })
    }

    fn headers(&self) -> Result<HeaderMap, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.bearer_token))
                .map_err(|e| PipelineError::InvalidResponse(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post(&self, body: Value) -> Result<Value, PipelineError> {
        let resp = self
            .http
            .post(self.url.clone())
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(PipelineError::NonSuccess {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| PipelineError::InvalidResponse(format!("{e}. body: {text}")))
    }

    /// `tools/list`: POSTs the incoming request params verbatim; the response
    /// is a JSON array whose first element's `tools` field is the definitions.
    pub async fn list_tools(&self, params: Value) -> Result<Vec<PipelineToolDef>, PipelineError> {
        let body = params;
        let value = self.post(body).await?;

        let first = value
            .as_array()
            .and_then(|arr| arr.first())
            .ok_or_else(|| PipelineError::InvalidResponse("expected a non-empty array".into()))?;

        let tools = first
            .get("tools")
            .ok_or_else(|| PipelineError::InvalidResponse("missing 'tools' field".into()))?;

        serde_json::from_value(tools.clone())
            .map_err(|e| PipelineError::InvalidResponse(e.to_string()))
    }

    /// `tools/call`: injects `sl_tool_name` into the argument object and
    /// returns the pipeline's first response element verbatim.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, PipelineError> {
        let mut map: Map<String, Value> = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(PipelineError::InvalidResponse(format!(
                    "tool arguments must be an object, got {other}"
                )));
            }
        };
        map.insert("sl_tool_name".to_string(), json!(name));

        let value = self.post(Value::Object(map)).await?;

        let first = value
            .as_array()
            .and_then(|arr| arr.first().cloned())
            .ok_or_else(|| PipelineError::InvalidResponse("expected a non-empty array".into()))?;

        Ok(first)
    }
}
