use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use crate::auth::TokenProvider;
use crate::models::EntityKind;

use super::TransportError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lightweight reachability endpoint used by the health probe.
const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One logical fetch against the stats API.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub kind: EntityKind,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    /// Validator from the last successful fetch; attached as
    /// `If-None-Match` for idempotent requests only.
    pub validator: Option<String>,
}

impl FetchRequest {
    pub fn get(kind: EntityKind, validator: Option<String>) -> Self {
        Self {
            kind,
            method: Method::Get,
            body: None,
            validator,
        }
    }
}

/// Result of a successful round trip.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Fresh payload; `validator` is the server's new ETag, if any.
    Ok {
        validator: Option<String>,
        body: Vec<u8>,
    },
    /// 304 — the cached payload is still current.
    NotModified,
}

/// Seam between the sync coordinator and the network.
/// Implementations carry no cache state; fakes are trivial.
pub trait Transport: Send + Sync + 'static {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchOutcome, TransportError>> + Send;

    /// Cheap reachability check for the health probe.
    fn probe(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Production transport on reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            tokens,
        })
    }

    fn endpoint_url(&self, kind: EntityKind) -> String {
        let path = match kind {
            EntityKind::Players => "/v2/players",
            EntityKind::Fixtures => "/v2/fixtures",
            EntityKind::TeamRatings => "/v2/team-ratings",
            EntityKind::LiveScores => "/v2/live-scores",
        };
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, TransportError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.tokens.current_token() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TransportError::Network(format!("Invalid auth header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, TransportError> {
        let url = self.endpoint_url(request.kind);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        builder = builder.headers(self.auth_headers()?);

        // Conditional headers only make sense for idempotent reads.
        if request.method == Method::Get {
            if let Some(validator) = &request.validator {
                builder = builder.header(header::IF_NONE_MATCH, validator);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!(kind = %request.kind, "Not modified");
            return Ok(FetchOutcome::NotModified);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, &body));
        }

        let validator = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?
            .to_vec();

        debug!(kind = %request.kind, bytes = body.len(), etag = ?validator, "Fetched");
        Ok(FetchOutcome::Ok { validator, body })
    }

    async fn probe(&self) -> Result<(), TransportError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::from_status(status, &body))
        }
    }
}
