//! Single-exchange HTTP helper shared by every adapter.
//!
//! [`HttpTransport`] owns a pooled [`reqwest::Client`], the provider's base URL
//! and the per-request timeout. Every call performs exactly one exchange and
//! returns a [`ProviderResponse`] whatever the status code; classifying the
//! status is the caller's job. Bodies are decoded as JSON when possible and
//! otherwise wrapped as `{"raw_response": "<text>"}`.

use std::fmt::Display;
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use serde_json::{Value, json};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

use crate::error::SwitchError;
use crate::model::ProviderId;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A decoded provider answer.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// HTTP status of the answer.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Decoded body: JSON as sent, `null` when empty, otherwise `{"raw_response": text}`.
    pub body: Value,
}

impl ProviderResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 401 or 403, the statuses that trigger one re-authentication.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }

    /// Passes 2xx responses through and turns anything else into
    /// [`SwitchError::Payment`] carrying the status and body.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Payment`] for non-2xx responses.
    pub fn into_success(self, message: impl Display) -> Result<Self, SwitchError> {
        if self.is_success() {
            Ok(self)
        } else {
            let detail = error_detail(&self.body);
            let message = match detail {
                Some(detail) => format!("{message}: {detail}"),
                None => message.to_string(),
            };
            Err(SwitchError::payment(message, self.status, self.body))
        }
    }
}

/// Pulls a provider's human-readable error text out of common body shapes.
fn error_detail(body: &Value) -> Option<String> {
    ["/message", "/error_message", "/error/message", "/error", "/status/message"]
        .iter()
        .find_map(|p| body.pointer(p).and_then(Value::as_str))
        .map(str::to_owned)
}

/// HTTP client bound to one provider's base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    provider: ProviderId,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for `provider` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the URL cannot be parsed.
    pub fn try_new(provider: ProviderId, base_url: &str) -> Result<Self, SwitchError> {
        let mut normalized = base_url.trim().trim_end_matches('/').to_owned();
        normalized.push('/');
        let base_url = Url::parse(&normalized).map_err(|e| {
            SwitchError::Configuration(format!("invalid base url '{base_url}' for {provider}: {e}"))
        })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            provider,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the underlying client, e.g. to share a pool across adapters.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The API root, always ending in `/`.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The provider this transport talks to.
    #[must_use]
    pub const fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// The per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves `path` against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, SwitchError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SwitchError::Configuration(format!("invalid endpoint '{path}': {e}")))
    }

    /// `GET` helper.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn get(
        &self,
        path: &str,
        headers: HeaderMap,
        context: &'static str,
    ) -> Result<ProviderResponse, SwitchError> {
        self.send(Method::GET, path, headers, None, context).await
    }

    /// `POST` helper with an optional JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn post_json(
        &self,
        path: &str,
        headers: HeaderMap,
        body: Option<&Value>,
        context: &'static str,
    ) -> Result<ProviderResponse, SwitchError> {
        self.send(Method::POST, path, headers, body, context).await
    }

    /// Performs one exchange with the configured timeout.
    ///
    /// `context` is a human-readable identifier used in tracing and error
    /// messages (e.g. `"POST /payments/v1/sessions"`).
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Transport`] on network failure or timeout and
    /// [`SwitchError::Configuration`] if the endpoint URL is invalid. Non-2xx
    /// statuses are not errors at this level.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "payswitch.http",
            skip_all,
            fields(
                provider = %self.provider,
                http.method = %method,
                http.path = path,
                http.status_code = tracing::field::Empty,
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            )
        )
    )]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: Option<&Value>,
        context: &'static str,
    ) -> Result<ProviderResponse, SwitchError> {
        let url = self.endpoint(path)?;
        let mut req = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(self.timeout);
        if let Some(body) = body {
            req = req.json(body);
        }
        let result = Self::exchange(req, context).await;
        record_result_on_span(&result);
        result
    }

    async fn exchange(
        req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<ProviderResponse, SwitchError> {
        let response = req
            .send()
            .await
            .map_err(|source| SwitchError::Transport { context, source })?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|source| SwitchError::Transport { context, source })?;
        Ok(ProviderResponse {
            status,
            headers,
            body: decode_body(&text),
        })
    }
}

/// Decodes a response body: JSON when it parses, `Null` when empty,
/// otherwise `{"raw_response": text}`.
#[must_use]
pub fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw_response": text }))
}

#[cfg(feature = "telemetry")]
fn record_result_on_span(result: &Result<ProviderResponse, SwitchError>) {
    let span = Span::current();
    match result {
        Ok(response) => {
            span.record("http.status_code", response.status.as_u16());
            span.record(
                "otel.status_code",
                if response.is_success() { "OK" } else { "ERROR" },
            );
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to provider failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
const fn record_result_on_span(_result: &Result<ProviderResponse, SwitchError>) {}
