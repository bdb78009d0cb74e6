//! Airtel Money collection adapter.
//!
//! Access tokens come from an OAuth2 client-credentials grant and are renewed
//! 300 seconds before `expires_in` runs out. Every protected call carries
//! `X-Country` and `X-Currency` next to the bearer token. Amounts travel in
//! major units. Callbacks are signed with HMAC-SHA256 over the canonical
//! (sorted-key, compact) JSON form of the body.

use async_trait::async_trait;
use chrono::Utc;
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderMap, Method};
use payswitch::adapter::{self, Adapter};
use payswitch::amount::{self, CurrencyBounds, CurrencyRules};
use payswitch::auth::{AuthCache, AuthToken, ClientCredentials};
use payswitch::config::ProviderConfig;
use payswitch::extract;
use payswitch::status::StatusMap;
use payswitch::transport::HttpTransport;
use payswitch::webhook::{SignatureAlgorithm, SignedBody, WebhookVerifier};
use payswitch::{
    Currency, CustomerInfo, Metadata, PaymentResponse, ProviderId, SwitchError,
    TransactionDetail, TransactionStatus, TransactionStatusResponse, WebhookEvent,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::support::{insert_header, json_headers};

/// Airtel Africa UAT API root.
pub const SANDBOX_URL: &str = "https://openapiuat.airtel.africa";
/// Airtel Africa production API root.
pub const PRODUCTION_URL: &str = "https://openapi.airtel.africa";

const TOKEN_PATH: &str = "auth/oauth2/token";
const DEFAULT_COUNTRY: &str = "NG";

const SIGNATURE_HEADERS: &[&str] = &["x-airtel-signature", "x-signature"];

const STATUSES: StatusMap = StatusMap::new(&[
    ("ts", TransactionStatus::Successful),
    ("tf", TransactionStatus::Failed),
    ("ta", TransactionStatus::Pending),
    ("tp", TransactionStatus::Pending),
    ("tn", TransactionStatus::Failed),
    ("tr", TransactionStatus::Refunded),
    ("tc", TransactionStatus::Cancelled),
]);

const X_COUNTRY: HeaderName = HeaderName::from_static("x-country");
const X_CURRENCY: HeaderName = HeaderName::from_static("x-currency");

/// Airtel Money adapter.
#[derive(Debug)]
pub struct AirtelMoneyAdapter {
    auth: AuthCache,
    rules: CurrencyRules,
    verifier: WebhookVerifier,
    has_credentials: bool,
    country: String,
    currency: Currency,
}

impl AirtelMoneyAdapter {
    /// Registry key.
    pub const ID: &'static str = "airtel";

    /// Builds the adapter. The `country` option sets the `X-Country` value
    /// used when a call has no customer country; `default_currency` does the
    /// same for `X-Currency`.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the base URL is invalid.
    pub fn new(config: &ProviderConfig) -> Result<Self, SwitchError> {
        let credentials = &config.credentials;
        let transport = HttpTransport::try_new(
            ProviderId::new(Self::ID),
            config.base_url_or(SANDBOX_URL, PRODUCTION_URL),
        )?
        .with_timeout(config.timeout());
        let source = ClientCredentials::new(
            TOKEN_PATH,
            credentials.field("client_id").unwrap_or_default(),
            credentials.field("client_secret").unwrap_or_default(),
        );
        let verifier = WebhookVerifier::new(
            SignatureAlgorithm::HmacSha256,
            SignedBody::CanonicalJson,
            SIGNATURE_HEADERS,
        )
        .with_secret(credentials.field("webhook_secret").or(credentials.field("api_key")))
        .with_unsigned_policy(config.unsigned_policy());

        Ok(Self {
            auth: AuthCache::new(source, transport),
            rules: CurrencyRules::new([
                CurrencyBounds::whole(Currency::UGX, 500, 10_000_000),
                CurrencyBounds::whole(Currency::TZS, 500, 10_000_000),
                CurrencyBounds::whole(Currency::KES, 10, 500_000),
                CurrencyBounds::whole(Currency::RWF, 100, 5_000_000),
                CurrencyBounds::whole(Currency::ZMW, 1, 50_000),
                CurrencyBounds::whole(Currency::MWK, 100, 5_000_000),
                CurrencyBounds::whole(Currency::NGN, 50, 1_000_000),
                CurrencyBounds::whole(Currency::CDF, 500, 10_000_000),
                CurrencyBounds::whole(Currency::XOF, 100, 5_000_000),
                CurrencyBounds::whole(Currency::GHS, 1, 50_000),
                CurrencyBounds::whole(Currency::BIF, 500, 10_000_000),
                CurrencyBounds::whole(Currency::ETB, 10, 500_000),
                CurrencyBounds::whole(Currency::BWP, 1, 50_000),
                CurrencyBounds::whole(Currency::ZWL, 100, 10_000_000),
            ]),
            verifier,
            has_credentials: credentials.has_all(&["client_id", "client_secret"]),
            country: config.option("country").unwrap_or(DEFAULT_COUNTRY).to_owned(),
            currency: config.default_currency.unwrap_or(Currency::NGN),
        })
    }

    /// [`new`](Self::new), boxed for the registry.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn boxed(config: &ProviderConfig) -> Result<Box<dyn Adapter>, SwitchError> {
        Ok(Box::new(Self::new(config)?))
    }

    fn headers(token: &AuthToken, country: &str, currency: Currency) -> Result<HeaderMap, SwitchError> {
        let mut headers = json_headers();
        headers.insert(AUTHORIZATION, token.header_value("Bearer ")?);
        insert_header(&mut headers, X_COUNTRY, country)?;
        insert_header(&mut headers, X_CURRENCY, currency.code())?;
        Ok(headers)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
        scope: (&str, Currency),
        failure: String,
    ) -> Result<Value, SwitchError> {
        let (country, currency) = scope;
        let response = self
            .auth
            .send(method, path, body, context, |token| Self::headers(token, country, currency))
            .await?
            .into_success(failure)?;
        Ok(response.body)
    }

    fn default_scope(&self) -> (&str, Currency) {
        (self.country.as_str(), self.currency)
    }

    fn country_for<'a>(&'a self, transaction: &'a TransactionDetail) -> &'a str {
        transaction.customer_country().unwrap_or(self.country.as_str())
    }
}

/// Status code nested at `/status/code` of a transaction object.
fn status_of(transaction: &Value, fallback: &str) -> TransactionStatus {
    STATUSES.normalize(extract::str_at(transaction, "/status/code").unwrap_or(fallback))
}

fn status_metadata(transaction: &Value) -> Metadata {
    let mut metadata = Metadata::new();
    for (key, pointer) in [("message", "/status/message"), ("response_code", "/status/response_code")] {
        if let Some(value) = extract::string_at(transaction, pointer) {
            metadata.insert(key.to_owned(), Value::String(value));
        }
    }
    metadata
}

fn transaction_id_of(transaction: &Value) -> Option<String> {
    extract::first_string_at(transaction, &["/id", "/airtel_money_id"])
}

#[async_trait]
impl Adapter for AirtelMoneyAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::new(Self::ID)
    }

    fn validate_credentials(&self) -> bool {
        self.has_credentials
    }

    fn currency_rules(&self) -> &CurrencyRules {
        &self.rules
    }

    fn normalize_status(&self, raw: &str) -> TransactionStatus {
        STATUSES.normalize(raw)
    }

    async fn auth_headers(&self) -> Result<HeaderMap, SwitchError> {
        let token = self.auth.ensure_token().await?;
        let (country, currency) = self.default_scope();
        Self::headers(&token, country, currency)
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> Result<Value, SwitchError> {
        self.rules.validate(transaction.amount, transaction.currency)?;
        let msisdn = adapter::required_msisdn(transaction)?;
        let country = self.country_for(transaction);
        let id = if transaction.transaction_id.is_empty() {
            &transaction.reference
        } else {
            &transaction.transaction_id
        };
        Ok(json!({
            "reference": transaction.reference,
            "subscriber": {
                "country": country,
                "currency": transaction.currency.code(),
                "msisdn": msisdn,
            },
            "transaction": {
                "amount": amount::amount_to_json(transaction.amount),
                "country": country,
                "currency": transaction.currency.code(),
                "id": id,
            },
        }))
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.airtel.send_payment", skip_all, err, fields(reference = %transaction.reference))
    )]
    async fn send_payment(
        &self,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError> {
        let payload = self.format_transaction(transaction)?;
        let scope = (self.country_for(transaction), transaction.currency);
        let body = self
            .call(
                Method::POST,
                "merchant/v1/payments/",
                Some(&payload),
                "POST /merchant/v1/payments/",
                scope,
                "Airtel Money payment request failed".to_owned(),
            )
            .await?;
        let data = body.pointer("/data/transaction").cloned().unwrap_or(Value::Null);
        let mut metadata = status_metadata(&data);
        if let Some(msisdn) = payload.pointer("/subscriber/msisdn") {
            metadata.insert("msisdn".to_owned(), msisdn.clone());
        }

        Ok(PaymentResponse {
            transaction_id: transaction_id_of(&data).unwrap_or_else(|| transaction.transaction_id.clone()),
            reference: transaction.reference.clone(),
            provider: self.provider(),
            status: status_of(&data, "tp"),
            amount: transaction.amount,
            currency: transaction.currency,
            payment_link: None,
            transaction_token: extract::string_at(&data, "/id"),
            customer: transaction.customer.clone(),
            created_at: Some(Utc::now()),
            expires_at: None,
            metadata,
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.airtel.check_status", skip_all, err, fields(id = transaction_id))
    )]
    async fn check_status(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatusResponse, SwitchError> {
        let path = format!("standard/v1/payments/{transaction_id}");
        let body = self
            .call(
                Method::GET,
                &path,
                None,
                "GET /standard/v1/payments/{id}",
                self.default_scope(),
                format!("failed to verify Airtel Money transaction {transaction_id}"),
            )
            .await?;
        let tx = body.pointer("/data/transaction").cloned().unwrap_or(Value::Null);

        Ok(TransactionStatusResponse {
            transaction_id: transaction_id_of(&tx).unwrap_or_else(|| transaction_id.to_owned()),
            provider: self.provider(),
            status: status_of(&tx, "tn"),
            amount: extract::decimal_at(&tx, "/amount").unwrap_or_default(),
            data: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.airtel.refund", skip_all, err, fields(id = transaction_id))
    )]
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError> {
        let mut payload = json!({ "transaction": { "airtel_money_id": transaction_id } });
        if let Some(amount) = amount {
            if amount <= Decimal::ZERO {
                return Err(SwitchError::invalid_field("amount", "refund amount must be strictly positive"));
            }
            payload["transaction"]["amount"] = amount::amount_to_json(amount);
        }
        let body = self
            .call(
                Method::POST,
                "standard/v1/payments/refund",
                Some(&payload),
                "POST /standard/v1/payments/refund",
                self.default_scope(),
                "Airtel Money refund failed".to_owned(),
            )
            .await?;
        let data = body.pointer("/data/transaction").cloned().unwrap_or(Value::Null);
        let mut metadata = status_metadata(&data);
        if let Some(refund_id) = extract::string_at(&data, "/id") {
            metadata.insert("refund_id".to_owned(), Value::String(refund_id));
        }

        Ok(PaymentResponse {
            transaction_id: transaction_id.to_owned(),
            reference: format!("refund-{transaction_id}"),
            provider: self.provider(),
            status: status_of(&data, "tp"),
            amount: extract::decimal_at(&data, "/amount").or(amount).unwrap_or_default(),
            currency: extract::currency_at(&data, "/currency", self.currency, "airtel refund")?,
            payment_link: None,
            transaction_token: None,
            customer: None,
            created_at: Some(Utc::now()),
            expires_at: None,
            metadata,
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.airtel.transaction_detail", skip_all, err, fields(id = transaction_id))
    )]
    async fn transaction_detail(&self, transaction_id: &str) -> Result<TransactionDetail, SwitchError> {
        let path = format!("standard/v1/payments/{transaction_id}");
        let body = self
            .call(
                Method::GET,
                &path,
                None,
                "GET /standard/v1/payments/{id}",
                self.default_scope(),
                format!("failed to retrieve Airtel Money transaction {transaction_id}"),
            )
            .await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let tx = data.get("transaction").cloned().unwrap_or(Value::Null);

        let mut subscriber_metadata = Metadata::new();
        for (key, pointer) in [("country", "/subscriber/country"), ("subscriber_type", "/subscriber/type")] {
            if let Some(value) = extract::string_at(&data, pointer) {
                subscriber_metadata.insert(key.to_owned(), Value::String(value));
            }
        }
        let customer = CustomerInfo {
            phone_number: extract::string_at(&data, "/subscriber/msisdn"),
            first_name: extract::string_at(&data, "/subscriber/first_name"),
            last_name: extract::string_at(&data, "/subscriber/last_name"),
            country: extract::string_at(&data, "/subscriber/country"),
            metadata: subscriber_metadata,
            ..CustomerInfo::default()
        };

        let id = transaction_id_of(&tx).unwrap_or_else(|| transaction_id.to_owned());
        let reference = extract::string_at(&tx, "/reference").unwrap_or_else(|| id.clone());
        let mut detail = TransactionDetail::new(
            id,
            reference,
            extract::decimal_at(&tx, "/amount").unwrap_or_default(),
            extract::currency_at(&tx, "/currency", self.currency, "airtel transaction")?,
        );
        detail.status = status_of(&tx, "tn");
        detail.provider = Some(self.provider());
        detail.customer = Some(customer);
        detail.created_at = extract::datetime_at(&tx, "/created_at").unwrap_or(detail.created_at);
        detail.updated_at = extract::datetime_at(&tx, "/updated_at");
        detail.completed_at = extract::datetime_at(&tx, "/completed_at");
        detail.metadata = status_metadata(&tx);
        detail.raw_data = body;
        Ok(detail)
    }

    fn parse_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, SwitchError> {
        if !self.verifier.verify(raw_body, headers) {
            return Err(SwitchError::webhook("invalid Airtel Money webhook signature"));
        }
        let payload = adapter::webhook_body(raw_body)?;
        let tx = payload.get("transaction").cloned().unwrap_or(Value::Null);

        let mut context = Metadata::new();
        if let Some(msisdn) = extract::string_at(&tx, "/msisdn") {
            context.insert("msisdn".to_owned(), Value::String(msisdn));
        }
        if let Some(country) = headers.get("x-country").and_then(|v| v.to_str().ok()) {
            context.insert("country".to_owned(), Value::String(country.to_owned()));
        }

        Ok(WebhookEvent {
            event_type: extract::string_at(&payload, "/event_type")
                .unwrap_or_else(|| "payment_notification".to_owned()),
            provider: self.provider(),
            transaction_id: transaction_id_of(&tx).ok_or_else(|| {
                SwitchError::decode("airtel webhook", "missing transaction id", payload.clone())
            })?,
            status: status_of(&tx, "tn"),
            amount: extract::decimal_at(&tx, "/amount").unwrap_or_default(),
            currency: extract::currency_at(&tx, "/currency", self.currency, "airtel webhook")?,
            received_at: extract::datetime_at(&tx, "/created_at").unwrap_or_else(Utc::now),
            metadata: status_metadata(&tx),
            context,
            raw_data: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use http::HeaderValue;
    use payswitch::auth::AuthCredential;
    use payswitch::webhook::canonicalize;
    use sha2::Sha256;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        ProviderConfig::new(
            AuthCredential::default()
                .with_client_credentials("client", "secret")
                .with_webhook_secret("hook"),
        )
        .with_base_url(server.uri())
        .with_option("country", "UG")
        .with_default_currency(Currency::UGX)
    }

    fn transaction() -> TransactionDetail {
        TransactionDetail::new("tx_1", "ref_1", Decimal::from(1500), Currency::UGX).with_customer(
            CustomerInfo::default()
                .with_phone_number("+256 700-123456")
                .with_country("UG"),
        )
    }

    async fn mount_token(server: &MockServer, expect: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .and(body_json(json!({
                "client_id": "client",
                "client_secret": "secret",
                "grant_type": "client_credentials",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok_1",
                "expires_in": 3600,
                "token_type": "bearer",
            })))
            .expect(expect)
            .mount(server)
            .await;
    }

    #[test]
    fn test_credentials_require_client_pair() {
        let adapter = AirtelMoneyAdapter::new(
            &ProviderConfig::new(AuthCredential::default().with_api_key("k")),
        )
        .unwrap();
        assert!(!adapter.validate_credentials());
    }

    #[test]
    fn test_status_codes() {
        let adapter = AirtelMoneyAdapter::new(&ProviderConfig::default()).unwrap();
        assert_eq!(adapter.normalize_status("TS"), TransactionStatus::Successful);
        assert_eq!(adapter.normalize_status("tn"), TransactionStatus::Failed);
        assert_eq!(adapter.normalize_status("ta"), TransactionStatus::Pending);
        assert_eq!(adapter.normalize_status("tc"), TransactionStatus::Cancelled);
        assert_eq!(adapter.normalize_status("zz"), TransactionStatus::Unknown);
    }

    #[test]
    fn test_format_transaction_needs_digits_only_msisdn() {
        let adapter = AirtelMoneyAdapter::new(&ProviderConfig::default()).unwrap();
        let payload = adapter.format_transaction(&transaction()).unwrap();
        assert_eq!(payload["subscriber"]["msisdn"], "256700123456");
        assert_eq!(payload["subscriber"]["country"], "UG");
        assert_eq!(payload["transaction"]["amount"], json!(1500.0));
        assert_eq!(payload["transaction"]["id"], "tx_1");

        let mut no_phone = transaction();
        no_phone.customer = None;
        let err = adapter.format_transaction(&no_phone).unwrap_err();
        assert!(matches!(err, SwitchError::Validation { field: Some(ref f), .. } if f == "customer.phone_number"));
    }

    #[tokio::test]
    async fn test_send_payment_authenticates_once() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/merchant/v1/payments/"))
            .and(header("authorization", "Bearer tok_1"))
            .and(header("x-country", "UG"))
            .and(header("x-currency", "UGX"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"transaction": {"id": "AM123", "status": {"code": "TP", "message": "in progress"}}},
                "status": {"success": true},
            })))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = AirtelMoneyAdapter::new(&config(&server)).unwrap();
        let first = adapter.send_payment(&transaction()).await.unwrap();
        assert_eq!(first.transaction_id, "AM123");
        assert!(first.is_pending());
        assert_eq!(first.metadata["msisdn"], "256700123456");
        adapter.send_payment(&transaction()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_token_is_renewed_once() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;
        Mock::given(method("GET"))
            .and(path("/standard/v1/payments/AM123"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/standard/v1/payments/AM123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"transaction": {"id": "AM123", "amount": "1500", "status": {"code": "TS"}}},
            })))
            .mount(&server)
            .await;

        let adapter = AirtelMoneyAdapter::new(&config(&server)).unwrap();
        let status = adapter.check_status("AM123").await.unwrap();
        assert_eq!(status.status, TransactionStatus::Successful);
        assert_eq!(status.amount, Decimal::from(1500));
        assert_eq!(status.data["data"]["transaction"]["id"], "AM123");
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_token_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok_1", "expires_in": 3600}))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/standard/v1/payments/AM123"))
            .and(header("authorization", "Bearer tok_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"transaction": {"id": "AM123", "amount": 1500, "status": {"code": "TP"}}},
            })))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = AirtelMoneyAdapter::new(&config(&server)).unwrap();
        let (first, second) = tokio::join!(adapter.check_status("AM123"), adapter.check_status("AM123"));
        assert_eq!(first.unwrap().status, TransactionStatus::Pending);
        assert_eq!(second.unwrap().status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_token_exchange_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_client"})))
            .mount(&server)
            .await;

        let adapter = AirtelMoneyAdapter::new(&config(&server)).unwrap();
        let err = adapter.check_status("AM123").await.unwrap_err();
        assert!(matches!(err, SwitchError::Authentication { .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refund_and_detail() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/standard/v1/payments/refund"))
            .and(body_json(json!({"transaction": {"airtel_money_id": "AM123"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"transaction": {"id": "RF9", "status": {"code": "TR"}}},
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/standard/v1/payments/AM123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "transaction": {
                        "id": "AM123",
                        "reference": "ref_1",
                        "amount": 1500,
                        "currency": "UGX",
                        "status": {"code": "TS", "message": "done"},
                    },
                    "subscriber": {"msisdn": "256700123456", "country": "UG", "first_name": "Okello"},
                },
            })))
            .mount(&server)
            .await;

        let adapter = AirtelMoneyAdapter::new(&config(&server)).unwrap();
        let refund = adapter.refund("AM123", None).await.unwrap();
        assert_eq!(refund.status, TransactionStatus::Refunded);
        assert_eq!(refund.metadata["refund_id"], "RF9");
        assert_eq!(refund.currency, Currency::UGX);

        let detail = adapter.transaction_detail("AM123").await.unwrap();
        assert_eq!(detail.reference, "ref_1");
        assert_eq!(detail.status, TransactionStatus::Successful);
        let customer = detail.customer.unwrap();
        assert_eq!(customer.phone_number.as_deref(), Some("256700123456"));
        assert_eq!(customer.first_name.as_deref(), Some("Okello"));
        assert_eq!(detail.metadata["message"], "done");
        assert_eq!(detail.raw_data["data"]["subscriber"]["first_name"], "Okello");
    }

    #[tokio::test]
    async fn test_cancel_is_unsupported() {
        let adapter = AirtelMoneyAdapter::new(&ProviderConfig::default()).unwrap();
        let err = adapter.cancel_transaction("AM123").await.unwrap_err();
        assert!(matches!(err, SwitchError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_webhook_signed_over_canonical_json() {
        let adapter = AirtelMoneyAdapter::new(
            &ProviderConfig::new(AuthCredential::default().with_webhook_secret("hook")),
        )
        .unwrap();
        let body = br#"{ "transaction": { "status": {"code": "TS", "message": "ok"}, "id": "AM123", "amount": 1500, "currency": "UGX", "msisdn": "256700123456" } }"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"hook").unwrap();
        mac.update(&canonicalize(body).unwrap());
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-signature", HeaderValue::from_str(&signature).unwrap());
        headers.insert("x-country", HeaderValue::from_static("UG"));
        let event = adapter.parse_webhook(body, &headers).unwrap();
        assert_eq!(event.event_type, "payment_notification");
        assert_eq!(event.transaction_id, "AM123");
        assert_eq!(event.status, TransactionStatus::Successful);
        assert_eq!(event.currency, Currency::UGX);
        assert_eq!(event.context["msisdn"], "256700123456");
        assert_eq!(event.context["country"], "UG");

        headers.insert("x-signature", HeaderValue::from_static("00"));
        assert!(matches!(
            adapter.parse_webhook(body, &headers),
            Err(SwitchError::WebhookVerification { .. })
        ));
    }
}
