//! Credentials, tokens and the per-adapter authentication cache.
//!
//! Each adapter owns one [`AuthCache`]: an immutable [`TokenSource`] plus a
//! token slot behind an async mutex. The mutex is held across the handshake,
//! so concurrent callers that find the slot empty wait for the first caller's
//! token instead of authenticating again. The slot is written only after a
//! complete, successful handshake; a cancelled handshake leaves it untouched.
//!
//! Protected calls go through [`AuthCache::authorized`], which re-authenticates
//! and retries exactly once when the provider answers 401 or 403.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Method};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

#[cfg(feature = "telemetry")]
use tracing::{debug, warn};

use crate::error::SwitchError;
use crate::extract;
use crate::transport::{HttpTransport, ProviderResponse};

/// Secret bundle supplied when an adapter is constructed.
///
/// Which fields are required depends on the provider. `Debug` output
/// redacts every value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredential {
    /// API or secret key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Secret paired with `api_key` (MTN API user key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Account or API user name. Also read from `api_username`.
    #[serde(default, alias = "api_username", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password paired with `username`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// OAuth2 client identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth2 client secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Gateway subscription key (MTN `Ocp-Apim-Subscription-Key`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_key: Option<String>,
    /// Merchant code assigned by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_code: Option<String>,
    /// Shared secret used to verify inbound notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

impl AuthCredential {
    /// Returns a credential field by name if it is set and not blank.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "api_key" => &self.api_key,
            "api_secret" => &self.api_secret,
            "username" | "api_username" => &self.username,
            "password" => &self.password,
            "client_id" => &self.client_id,
            "client_secret" => &self.client_secret,
            "subscription_key" => &self.subscription_key,
            "merchant_code" => &self.merchant_code,
            "webhook_secret" => &self.webhook_secret,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// Returns `true` if every named field is set.
    #[must_use]
    pub fn has_all(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.field(name).is_some())
    }

    /// Returns a required field.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the field is absent or blank.
    pub fn require(&self, name: &'static str) -> Result<&str, SwitchError> {
        self.field(name)
            .ok_or_else(|| SwitchError::Configuration(format!("missing credential '{name}'")))
    }

    /// Sets `api_key`.
    #[must_use]
    pub fn with_api_key(mut self, value: impl Into<String>) -> Self {
        self.api_key = Some(value.into());
        self
    }

    /// Sets `api_secret`.
    #[must_use]
    pub fn with_api_secret(mut self, value: impl Into<String>) -> Self {
        self.api_secret = Some(value.into());
        self
    }

    /// Sets `username`.
    #[must_use]
    pub fn with_username(mut self, value: impl Into<String>) -> Self {
        self.username = Some(value.into());
        self
    }

    /// Sets `password`.
    #[must_use]
    pub fn with_password(mut self, value: impl Into<String>) -> Self {
        self.password = Some(value.into());
        self
    }

    /// Sets the OAuth2 client id and secret.
    #[must_use]
    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Sets `subscription_key`.
    #[must_use]
    pub fn with_subscription_key(mut self, value: impl Into<String>) -> Self {
        self.subscription_key = Some(value.into());
        self
    }

    /// Sets `merchant_code`.
    #[must_use]
    pub fn with_merchant_code(mut self, value: impl Into<String>) -> Self {
        self.merchant_code = Some(value.into());
        self
    }

    /// Sets `webhook_secret`.
    #[must_use]
    pub fn with_webhook_secret(mut self, value: impl Into<String>) -> Self {
        self.webhook_secret = Some(value.into());
        self
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: Option<&String>) -> Option<&'static str> {
            value.map(|_| "<redacted>")
        }
        f.debug_struct("AuthCredential")
            .field("api_key", &redact(self.api_key.as_ref()))
            .field("api_secret", &redact(self.api_secret.as_ref()))
            .field("username", &redact(self.username.as_ref()))
            .field("password", &redact(self.password.as_ref()))
            .field("client_id", &redact(self.client_id.as_ref()))
            .field("client_secret", &redact(self.client_secret.as_ref()))
            .field("subscription_key", &redact(self.subscription_key.as_ref()))
            .field("merchant_code", &redact(self.merchant_code.as_ref()))
            .field("webhook_secret", &redact(self.webhook_secret.as_ref()))
            .finish()
    }
}

/// An acquired token with an optional expiry instant.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    expires_at: Option<Instant>,
}

impl AuthToken {
    /// A token that never expires.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// A token valid for `ttl` from now. A lifetime too large to represent
    /// as an [`Instant`] yields a token that never expires.
    #[must_use]
    pub fn expiring_in(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// The raw token, without any scheme prefix.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token stops being valid, or `None` if it never expires.
    #[must_use]
    pub const fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns `true` once the expiry instant has been reached.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Renders the token as a header value.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Authentication`] if the token contains bytes
    /// that are not valid in a header.
    pub fn header_value(&self, prefix: &str) -> Result<HeaderValue, SwitchError> {
        let mut value = HeaderValue::from_str(&format!("{prefix}{}", self.value)).map_err(|_| {
            SwitchError::authentication("token is not a valid header value", None, None)
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A way of obtaining a token for one provider.
#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Runs the handshake. Implementations must not touch the cache.
    async fn fetch(&self, transport: &HttpTransport) -> Result<AuthToken, SwitchError>;

    /// Whether a fresh handshake can yield a different token. Static keys
    /// return `false`, which disables the reactive retry.
    fn is_renewable(&self) -> bool {
        true
    }
}

/// Builds an HTTP basic `Authorization` value.
#[must_use]
pub fn basic_auth_value(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Maps a transport failure during a handshake: timeouts surface as-is,
/// other network failures become [`SwitchError::Authentication`].
#[must_use]
pub fn handshake_failure(err: SwitchError) -> SwitchError {
    match err {
        SwitchError::Transport { source, .. } if !source.is_timeout() => {
            SwitchError::authentication(format!("authentication endpoint unreachable: {source}"), None, None)
        }
        other => other,
    }
}

/// Extracts a token from a handshake response.
///
/// The token is read from the first of `token_pointers` present; the lifetime
/// from `/expires_in` (seconds), falling back to `default_ttl`. `margin` is
/// subtracted from the lifetime so the token is renewed before the provider
/// rejects it.
///
/// # Errors
///
/// Returns [`SwitchError::Authentication`] for non-2xx responses and for
/// bodies without a token.
pub fn parse_token_response(
    response: ProviderResponse,
    token_pointers: &[&str],
    default_ttl: Option<Duration>,
    margin: Duration,
) -> Result<AuthToken, SwitchError> {
    if !response.is_success() {
        return Err(SwitchError::authentication(
            "authentication endpoint rejected credentials",
            Some(response.status),
            Some(response.body),
        ));
    }
    let Some(value) = extract::first_string_at(&response.body, token_pointers) else {
        return Err(SwitchError::authentication(
            "authentication response carried no token",
            Some(response.status),
            Some(response.body),
        ));
    };
    let ttl = extract::decimal_at(&response.body, "/expires_in")
        .and_then(|secs| secs.to_u64())
        .map(Duration::from_secs)
        .or(default_ttl);
    Ok(match ttl {
        Some(ttl) => AuthToken::expiring_in(value, ttl.saturating_sub(margin)),
        None => AuthToken::new(value),
    })
}

/// A pre-issued key sent verbatim on every call. Never touches the network.
#[derive(Clone)]
pub struct StaticToken {
    value: String,
}

impl StaticToken {
    /// A static credential sent as the header value unchanged.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    /// A static HTTP basic credential.
    #[must_use]
    pub fn basic(username: &str, password: &str) -> Self {
        Self::new(basic_auth_value(username, password))
    }

    /// A static bearer credential.
    #[must_use]
    pub fn bearer(token: &str) -> Self {
        Self::new(format!("Bearer {token}"))
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch(&self, _transport: &HttpTransport) -> Result<AuthToken, SwitchError> {
        Ok(AuthToken::new(self.value.clone()))
    }

    fn is_renewable(&self) -> bool {
        false
    }
}

/// Exchanges HTTP basic credentials for a bearer token.
pub struct BasicExchange {
    path: String,
    authorization: String,
    headers: HeaderMap,
    margin: Duration,
}

impl BasicExchange {
    /// Posts to `path` with `username:password` as basic credentials.
    #[must_use]
    pub fn new(path: impl Into<String>, username: &str, password: &str) -> Self {
        Self {
            path: path.into(),
            authorization: basic_auth_value(username, password),
            headers: HeaderMap::new(),
            margin: Duration::ZERO,
        }
    }

    /// Extra headers sent with the exchange (e.g. a subscription key).
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Time subtracted from the announced token lifetime.
    #[must_use]
    pub const fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }
}

impl fmt::Debug for BasicExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicExchange")
            .field("path", &self.path)
            .field("authorization", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for BasicExchange {
    async fn fetch(&self, transport: &HttpTransport) -> Result<AuthToken, SwitchError> {
        let mut headers = self.headers.clone();
        let mut authorization = HeaderValue::from_str(&self.authorization).map_err(|_| {
            SwitchError::Configuration("basic credentials are not a valid header value".into())
        })?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        let response = transport
            .send(Method::POST, &self.path, headers, None, "POST token (basic)")
            .await
            .map_err(handshake_failure)?;
        parse_token_response(response, &["/access_token", "/token"], None, self.margin)
    }
}

/// Safety margin subtracted from OAuth2 token lifetimes.
pub const OAUTH_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Lifetime assumed when an OAuth2 response omits `expires_in`.
pub const OAUTH_DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// OAuth2 client-credentials grant with a JSON body.
pub struct ClientCredentials {
    path: String,
    client_id: String,
    client_secret: String,
    margin: Duration,
}

impl ClientCredentials {
    /// A grant posted to `path`, renewed [`OAUTH_EXPIRY_MARGIN`] early.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            margin: OAUTH_EXPIRY_MARGIN,
        }
    }

    /// Overrides the renewal margin.
    #[must_use]
    pub const fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("path", &self.path)
            .field("client_id", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .field("margin", &self.margin)
            .finish()
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch(&self, transport: &HttpTransport) -> Result<AuthToken, SwitchError> {
        let body = json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "grant_type": "client_credentials",
        });
        let response = transport
            .post_json(&self.path, HeaderMap::new(), Some(&body), "POST oauth2 token")
            .await
            .map_err(handshake_failure)?;
        parse_token_response(
            response,
            &["/access_token"],
            Some(OAUTH_DEFAULT_TTL),
            self.margin,
        )
    }
}

/// Token slot plus the source that fills it.
pub struct AuthCache {
    source: Box<dyn TokenSource>,
    transport: HttpTransport,
    slot: Mutex<Option<AuthToken>>,
}

impl fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCache")
            .field("source", &self.source)
            .field("provider", self.transport.provider())
            .finish_non_exhaustive()
    }
}

impl AuthCache {
    /// An empty cache filled from `source` over `transport`.
    #[must_use]
    pub fn new(source: impl TokenSource + 'static, transport: HttpTransport) -> Self {
        Self {
            source: Box::new(source),
            transport,
            slot: Mutex::new(None),
        }
    }

    /// The transport used for the handshake and protected calls.
    #[must_use]
    pub const fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// See [`TokenSource::is_renewable`].
    #[must_use]
    pub fn is_renewable(&self) -> bool {
        self.source.is_renewable()
    }

    /// Returns the cached token if it is still valid, otherwise runs the
    /// handshake while holding the slot lock and caches the result.
    ///
    /// # Errors
    ///
    /// Propagates handshake failures; the slot is left empty in that case.
    pub async fn ensure_token(&self) -> Result<AuthToken, SwitchError> {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.clone());
        }
        let token = self.source.fetch(&self.transport).await?;
        #[cfg(feature = "telemetry")]
        debug!(provider = %self.transport.provider(), "authentication token renewed");
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Clears the slot if it still holds `stale`. A token renewed by a
    /// concurrent caller is kept.
    pub async fn invalidate(&self, stale: &AuthToken) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|current| current.value == stale.value) {
            *slot = None;
        }
    }

    /// The currently cached token, valid or not.
    pub async fn cached(&self) -> Option<AuthToken> {
        self.slot.lock().await.clone()
    }

    /// Runs `call` with a valid token. On a 401/403 answer from a renewable
    /// source, invalidates that token and runs authentication and `call`
    /// exactly once more; the second answer is returned whatever its status.
    ///
    /// # Errors
    ///
    /// Propagates handshake failures and errors returned by `call`.
    pub async fn authorized<F, Fut>(&self, mut call: F) -> Result<ProviderResponse, SwitchError>
    where
        F: FnMut(AuthToken) -> Fut + Send,
        Fut: Future<Output = Result<ProviderResponse, SwitchError>> + Send,
    {
        let token = self.ensure_token().await?;
        let response = call(token.clone()).await?;
        if !response.is_auth_rejection() || !self.source.is_renewable() {
            return Ok(response);
        }
        #[cfg(feature = "telemetry")]
        warn!(
            provider = %self.transport.provider(),
            status = response.status.as_u16(),
            "provider rejected token, re-authenticating once"
        );
        self.invalidate(&token).await;
        let token = self.ensure_token().await?;
        call(token).await
    }

    /// One protected exchange through the cache's transport, with headers
    /// built from the token by `headers_for`.
    ///
    /// # Errors
    ///
    /// See [`authorized`](Self::authorized) and [`HttpTransport::send`].
    pub async fn send<H>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
        headers_for: H,
    ) -> Result<ProviderResponse, SwitchError>
    where
        H: Fn(&AuthToken) -> Result<HeaderMap, SwitchError> + Send + Sync,
    {
        self.authorized(|token| {
            let headers = headers_for(&token);
            let method = method.clone();
            async move {
                self.transport
                    .send(method, path, headers?, body, context)
                    .await
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderId;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::try_new(ProviderId::new("test"), &server.uri()).unwrap()
    }

    fn oauth_cache(server: &MockServer) -> AuthCache {
        AuthCache::new(
            ClientCredentials::new("auth/oauth2/token", "client", "secret"),
            transport(server),
        )
    }

    fn bearer(token: &AuthToken) -> Result<HeaderMap, SwitchError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token.header_value("Bearer ")?);
        Ok(headers)
    }

    async fn mount_token(server: &MockServer, token: &str, delay: Duration, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .and(body_partial_json(json!({"grant_type": "client_credentials"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": token, "expires_in": 3600}))
                    .set_delay(delay),
            )
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn test_credential_debug_redacts() {
        let credential = AuthCredential::default()
            .with_api_key("sk_live_123")
            .with_client_credentials("id", "very-secret");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("sk_live_123"));
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_credential_presence() {
        let credential = AuthCredential::default().with_api_key("k").with_username("  ");
        assert!(credential.has_all(&["api_key"]));
        assert!(!credential.has_all(&["api_key", "username"]));
        assert!(credential.require("username").is_err());
        assert_eq!(credential.field("api_username"), None);
        assert_eq!(credential.field("nonsense"), None);
    }

    #[test]
    fn test_basic_auth_value() {
        assert_eq!(basic_auth_value("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn test_static_source_never_touches_network() {
        let server = MockServer::start().await;
        let cache = AuthCache::new(StaticToken::bearer("sk_test"), transport(&server));
        let first = cache.ensure_token().await.unwrap();
        let second = cache.ensure_token().await.unwrap();
        assert_eq!(first.value(), "Bearer sk_test");
        assert_eq!(first, second);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_handshake() {
        let server = MockServer::start().await;
        mount_token(&server, "tok_1", Duration::from_millis(200), 1).await;
        let cache = Arc::new(oauth_cache(&server));

        let (a, b) = tokio::join!(cache.ensure_token(), cache.ensure_token());
        assert_eq!(a.unwrap().value(), "tok_1");
        assert_eq!(b.unwrap().value(), "tok_1");
    }

    #[tokio::test]
    async fn test_expired_token_is_renewed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "short", "expires_in": 300})),
            )
            .expect(2)
            .mount(&server)
            .await;
        let cache = oauth_cache(&server);
        let token = cache.ensure_token().await.unwrap();
        assert!(token.is_expired());
        cache.ensure_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_unrepresentable_lifetime_never_expires() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"access_token": "forever", "expires_in": 18_446_744_073_709_551_615_u64}),
            ))
            .expect(1)
            .mount(&server)
            .await;
        let cache = oauth_cache(&server);
        let token = cache.ensure_token().await.unwrap();
        assert_eq!(token.value(), "forever");
        assert!(token.expires_at().is_none());
        assert!(!token.is_expired());
        assert_eq!(cache.ensure_token().await.unwrap(), token);
    }

    #[test]
    fn test_expiring_in_saturates_to_no_expiry() {
        let token = AuthToken::expiring_in("t", Duration::MAX);
        assert!(token.expires_at().is_none());
        let short = AuthToken::expiring_in("t", Duration::from_secs(60));
        assert!(short.expires_at().is_some());
        assert!(!short.is_expired());
    }

    #[tokio::test]
    async fn test_failed_handshake_leaves_slot_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
            .mount(&server)
            .await;
        let cache = oauth_cache(&server);
        let err = cache.ensure_token().await.unwrap_err();
        assert!(matches!(err, SwitchError::Authentication { .. }));
        assert_eq!(err.status_code(), Some(http::StatusCode::UNAUTHORIZED));
        assert!(cache.cached().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_handshake_leaves_slot_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let cache = oauth_cache(&server);
        let outcome = tokio::time::timeout(Duration::from_millis(50), cache.ensure_token()).await;
        assert!(outcome.is_err());
        assert!(cache.cached().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_is_compare_and_clear() {
        let server = MockServer::start().await;
        mount_token(&server, "current", Duration::ZERO, 1).await;
        let cache = oauth_cache(&server);
        let current = cache.ensure_token().await.unwrap();

        cache.invalidate(&AuthToken::new("stale")).await;
        assert_eq!(cache.cached().await, Some(current.clone()));

        cache.invalidate(&current).await;
        assert!(cache.cached().await.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_call_retries_once() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", Duration::ZERO, 2).await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let cache = oauth_cache(&server);
        let response = cache
            .send(Method::GET, "protected", None, "GET /protected", bearer)
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_second_rejection_is_returned() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", Duration::ZERO, 2).await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;

        let cache = oauth_cache(&server);
        let response = cache
            .send(Method::GET, "protected", None, "GET /protected", bearer)
            .await
            .unwrap();
        assert_eq!(response.status, http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_static_source_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let cache = AuthCache::new(StaticToken::basic("user", "key"), transport(&server));
        let response = cache
            .send(Method::GET, "protected", None, "GET /protected", |token| {
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, token.header_value("")?);
                Ok(headers)
            })
            .await
            .unwrap();
        assert_eq!(response.status, http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_basic_exchange_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token/"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .and(header("ocp-apim-subscription-key", "sub"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "momo"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut extra = HeaderMap::new();
        extra.insert("ocp-apim-subscription-key", HeaderValue::from_static("sub"));
        let cache = AuthCache::new(
            BasicExchange::new("token/", "user", "pass").with_headers(extra),
            transport(&server),
        );
        let token = cache.ensure_token().await.unwrap();
        assert_eq!(token.value(), "momo");
        assert!(token.expires_at().is_none());
    }
}
