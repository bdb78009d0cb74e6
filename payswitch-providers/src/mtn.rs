//! MTN Mobile Money (MoMo) adapter.
//!
//! A bearer token is obtained by posting HTTP basic credentials to `token/`.
//! Every call, the exchange included, also carries the
//! `Ocp-Apim-Subscription-Key` header. Collections are asynchronous: a
//! request-to-pay is answered with `202 Accepted` and settles later.

use async_trait::async_trait;
use chrono::Utc;
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderMap, Method};
use payswitch::adapter::{self, Adapter};
use payswitch::amount::{CurrencyBounds, CurrencyRules};
use payswitch::auth::{AuthCache, AuthToken, BasicExchange};
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

/// MoMo API root, shared by sandbox and production.
pub const API_URL: &str = "https://api.mtn.com/v1/";

const TOKEN_PATH: &str = "token/";
const PAYER_MESSAGE: &str = "Payment request";
const PAYEE_NOTE: &str = "Thank you for your payment";

const SIGNATURE_HEADERS: &[&str] = &["x-signature"];

const STATUSES: StatusMap = StatusMap::new(&[
    ("PENDING", TransactionStatus::Pending),
    ("CREATED", TransactionStatus::Pending),
    ("ONGOING", TransactionStatus::Pending),
    ("SUCCESSFUL", TransactionStatus::Successful),
    ("FAILED", TransactionStatus::Failed),
    ("REJECTED", TransactionStatus::Failed),
    ("TIMEOUT", TransactionStatus::Failed),
    ("EXPIRED", TransactionStatus::Failed),
]);

const SUBSCRIPTION_KEY: HeaderName = HeaderName::from_static("ocp-apim-subscription-key");
const TARGET_ENVIRONMENT: HeaderName = HeaderName::from_static("x-target-environment");
const REFERENCE_ID: HeaderName = HeaderName::from_static("x-reference-id");

/// MTN MoMo adapter.
#[derive(Debug)]
pub struct MtnMomoAdapter {
    auth: AuthCache,
    rules: CurrencyRules,
    verifier: WebhookVerifier,
    has_credentials: bool,
    subscription_key: String,
    target_environment: String,
    currency: Currency,
}

impl MtnMomoAdapter {
    /// Registry key.
    pub const ID: &'static str = "mtn";

    /// Builds the adapter. `X-Target-Environment` is the `target_environment`
    /// option when set, else the configured environment name.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the base URL or the
    /// subscription key is not usable.
    pub fn new(config: &ProviderConfig) -> Result<Self, SwitchError> {
        let credentials = &config.credentials;
        let subscription_key = credentials.field("subscription_key").unwrap_or_default().to_owned();
        let transport =
            HttpTransport::try_new(ProviderId::new(Self::ID), config.base_url_or(API_URL, API_URL))?
                .with_timeout(config.timeout());

        let mut exchange_headers = HeaderMap::new();
        if !subscription_key.is_empty() {
            insert_header(&mut exchange_headers, SUBSCRIPTION_KEY, &subscription_key)?;
        }
        let source = BasicExchange::new(
            TOKEN_PATH,
            credentials.field("api_key").unwrap_or_default(),
            credentials.field("api_secret").unwrap_or_default(),
        )
        .with_headers(exchange_headers);
        let verifier = WebhookVerifier::new(
            SignatureAlgorithm::HmacSha256,
            SignedBody::Raw,
            SIGNATURE_HEADERS,
        )
        .with_secret(credentials.field("webhook_secret"))
        .with_unsigned_policy(config.unsigned_policy());

        Ok(Self {
            auth: AuthCache::new(source, transport),
            rules: CurrencyRules::new([
                CurrencyBounds::whole(Currency::GHS, 1, 50_000),
                CurrencyBounds::whole(Currency::UGX, 500, 10_000_000),
                CurrencyBounds::whole(Currency::XAF, 100, 1_000_000),
                CurrencyBounds::whole(Currency::XOF, 100, 1_000_000),
                CurrencyBounds::whole(Currency::RWF, 100, 5_000_000),
                CurrencyBounds::whole(Currency::ZMW, 1, 50_000),
                CurrencyBounds::whole(Currency::EUR, 1, 10_000),
            ]),
            verifier,
            has_credentials: credentials.has_all(&["api_key", "subscription_key"]),
            subscription_key,
            target_environment: config
                .option("target_environment")
                .unwrap_or(config.environment.as_str())
                .to_owned(),
            currency: config.default_currency.unwrap_or(Currency::EUR),
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

    fn headers(&self, token: &AuthToken, reference_id: Option<&str>) -> Result<HeaderMap, SwitchError> {
        let mut headers = json_headers();
        headers.insert(AUTHORIZATION, token.header_value("Bearer ")?);
        insert_header(&mut headers, SUBSCRIPTION_KEY, &self.subscription_key)?;
        insert_header(&mut headers, TARGET_ENVIRONMENT, &self.target_environment)?;
        if let Some(reference_id) = reference_id {
            insert_header(&mut headers, REFERENCE_ID, reference_id)?;
        }
        Ok(headers)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
        reference_id: Option<&str>,
        failure: String,
    ) -> Result<Value, SwitchError> {
        let response = self
            .auth
            .send(method, path, body, context, |token| self.headers(token, reference_id))
            .await?
            .into_success(failure)?;
        Ok(response.body)
    }

    async fn status_body(&self, reference: &str) -> Result<Value, SwitchError> {
        let path = format!("transaction/status/{reference}");
        self.call(
            Method::GET,
            &path,
            None,
            "GET /transaction/status/{reference}",
            None,
            format!("failed to retrieve MTN transaction {reference}"),
        )
        .await
    }
}

#[async_trait]
impl Adapter for MtnMomoAdapter {
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
        self.headers(&token, None)
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> Result<Value, SwitchError> {
        self.rules.validate(transaction.amount, transaction.currency)?;
        // The transaction id doubles as the X-Reference-Id of the request.
        if transaction.transaction_id.trim().is_empty() {
            return Err(SwitchError::invalid_field("transaction_id", "transaction id is required"));
        }
        let msisdn = adapter::required_msisdn(transaction)?;
        Ok(json!({
            "amount": transaction.amount.normalize().to_string(),
            "currency": transaction.currency.code(),
            "externalId": transaction.reference,
            "payer": {
                "partyIdType": "MSISDN",
                "partyId": msisdn,
            },
            "payerMessage": transaction.reason.as_deref().unwrap_or(PAYER_MESSAGE),
            "payeeNote": PAYEE_NOTE,
        }))
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.mtn.send_payment", skip_all, err, fields(reference = %transaction.reference))
    )]
    async fn send_payment(
        &self,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError> {
        let payload = self.format_transaction(transaction)?;
        let body = self
            .call(
                Method::POST,
                "collection/request-to-pay",
                Some(&payload),
                "POST /collection/request-to-pay",
                Some(transaction.transaction_id.as_str()),
                "MTN request-to-pay failed".to_owned(),
            )
            .await?;

        Ok(PaymentResponse {
            transaction_id: transaction.transaction_id.clone(),
            reference: transaction.reference.clone(),
            provider: self.provider(),
            status: TransactionStatus::Pending,
            amount: transaction.amount,
            currency: transaction.currency,
            payment_link: None,
            transaction_token: None,
            customer: transaction.customer.clone(),
            created_at: Some(Utc::now()),
            expires_at: None,
            metadata: Metadata::new(),
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.mtn.check_status", skip_all, err, fields(reference = reference))
    )]
    async fn check_status(&self, reference: &str) -> Result<TransactionStatusResponse, SwitchError> {
        let body = self.status_body(reference).await?;
        Ok(TransactionStatusResponse {
            transaction_id: extract::first_string_at(&body, &["/financialTransactionId", "/externalId"])
                .unwrap_or_else(|| reference.to_owned()),
            provider: self.provider(),
            status: STATUSES.normalize_opt(extract::str_at(&body, "/status")),
            amount: extract::decimal_at(&body, "/amount").unwrap_or_default(),
            data: body,
        })
    }

    /// MoMo refunds are disbursements against the original reference and
    /// need an explicit amount.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.mtn.refund", skip_all, err, fields(reference = transaction_id))
    )]
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError> {
        let amount = amount
            .filter(|amount| *amount > Decimal::ZERO)
            .ok_or_else(|| SwitchError::invalid_field("amount", "MTN refunds require a positive amount"))?;
        let refund_reference = format!("refund_{transaction_id}");
        let payload = json!({
            "amount": amount.normalize().to_string(),
            "currency": self.currency.code(),
            "externalId": refund_reference,
            "referenceIdToRefund": transaction_id,
            "payerMessage": "Refund processed",
            "payeeNote": "Refund",
        });
        let body = self
            .call(
                Method::POST,
                "disbursement/refund",
                Some(&payload),
                "POST /disbursement/refund",
                Some(refund_reference.as_str()),
                "MTN refund failed".to_owned(),
            )
            .await?;

        Ok(PaymentResponse {
            transaction_id: transaction_id.to_owned(),
            reference: refund_reference,
            provider: self.provider(),
            status: refund_status(&body),
            amount,
            currency: self.currency,
            payment_link: None,
            transaction_token: None,
            customer: None,
            created_at: Some(Utc::now()),
            expires_at: None,
            metadata: Metadata::new(),
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.mtn.transaction_detail", skip_all, err, fields(reference = transaction_id))
    )]
    async fn transaction_detail(&self, transaction_id: &str) -> Result<TransactionDetail, SwitchError> {
        let body = self.status_body(transaction_id).await?;
        let customer = CustomerInfo {
            phone_number: extract::string_at(&body, "/payer/partyId"),
            ..CustomerInfo::default()
        };
        let mut detail = TransactionDetail::new(
            extract::string_at(&body, "/financialTransactionId").unwrap_or_else(|| transaction_id.to_owned()),
            extract::string_at(&body, "/externalId").unwrap_or_else(|| transaction_id.to_owned()),
            extract::decimal_at(&body, "/amount").unwrap_or_default(),
            extract::currency_at(&body, "/currency", self.currency, "mtn transaction status")?,
        );
        detail.status = STATUSES.normalize_opt(extract::str_at(&body, "/status"));
        detail.provider = Some(self.provider());
        detail.customer = Some(customer);
        detail.reason = extract::first_string_at(&body, &["/reason/message", "/reason"]);
        detail.raw_data = body;
        Ok(detail)
    }

    fn parse_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, SwitchError> {
        if !self.verifier.verify(raw_body, headers) {
            return Err(SwitchError::webhook("invalid MTN webhook signature"));
        }
        let payload = adapter::webhook_body(raw_body)?;
        let mut context = Metadata::new();
        if let Some(party) = extract::string_at(&payload, "/payer/partyId") {
            context.insert("msisdn".to_owned(), Value::String(party));
        }

        Ok(WebhookEvent {
            event_type: extract::string_at(&payload, "/event_type")
                .unwrap_or_else(|| "payment.update".to_owned()),
            provider: self.provider(),
            transaction_id: extract::first_string_at(&payload, &["/externalId", "/financialTransactionId"])
                .ok_or_else(|| SwitchError::decode("mtn webhook", "missing transaction id", payload.clone()))?,
            status: STATUSES.normalize_opt(extract::str_at(&payload, "/status")),
            amount: extract::decimal_at(&payload, "/amount").unwrap_or_default(),
            currency: extract::currency_at(&payload, "/currency", self.currency, "mtn webhook")?,
            received_at: Utc::now(),
            metadata: Metadata::new(),
            context,
            raw_data: payload,
        })
    }
}

/// Refund calls usually answer `202` with an empty body.
fn refund_status(body: &Value) -> TransactionStatus {
    match STATUSES.normalize_opt(extract::str_at(body, "/status")) {
        TransactionStatus::Unknown => TransactionStatus::Pending,
        status => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use http::HeaderValue;
    use payswitch::auth::AuthCredential;
    use payswitch::config::Environment;
    use sha2::Sha256;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> AuthCredential {
        AuthCredential::default()
            .with_api_key("user")
            .with_subscription_key("sub_1")
            .with_webhook_secret("hook")
    }

    fn adapter(server: &MockServer) -> MtnMomoAdapter {
        MtnMomoAdapter::new(
            &ProviderConfig::new(credentials())
                .with_base_url(format!("{}/v1", server.uri()))
                .with_option("target_environment", "mtnuganda"),
        )
        .unwrap()
    }

    fn transaction() -> TransactionDetail {
        TransactionDetail::new(
            "3f1c2a9e-0d7b-4a55-9a3e-1f2b3c4d5e6f",
            "order_7",
            Decimal::new(25050, 2),
            Currency::EUR,
        )
        .with_customer(CustomerInfo::default().with_phone_number("+46 733 123 453"))
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/token/"))
            .and(header("ocp-apim-subscription-key", "sub_1"))
            .and(header("authorization", "Basic dXNlcjo="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "momo_tok",
                "token_type": "access_token",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_credentials_need_subscription_key() {
        let without = MtnMomoAdapter::new(&ProviderConfig::new(
            AuthCredential::default().with_api_key("user"),
        ))
        .unwrap();
        assert!(!without.validate_credentials());
        let with = MtnMomoAdapter::new(&ProviderConfig::new(credentials())).unwrap();
        assert!(with.validate_credentials());
    }

    #[test]
    fn test_target_environment_defaults_to_environment() {
        let adapter = MtnMomoAdapter::new(
            &ProviderConfig::new(credentials()).with_environment(Environment::Production),
        )
        .unwrap();
        assert_eq!(adapter.target_environment, "production");
    }

    #[test]
    fn test_status_vocabulary() {
        let adapter = MtnMomoAdapter::new(&ProviderConfig::new(credentials())).unwrap();
        assert_eq!(adapter.normalize_status("SUCCESSFUL"), TransactionStatus::Successful);
        assert_eq!(adapter.normalize_status("rejected"), TransactionStatus::Failed);
        assert_eq!(adapter.normalize_status("ONGOING"), TransactionStatus::Pending);
        assert_eq!(adapter.normalize_status("REFUNDED"), TransactionStatus::Unknown);
    }

    #[tokio::test]
    async fn test_request_to_pay_is_pending() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/collection/request-to-pay"))
            .and(header("authorization", "Bearer momo_tok"))
            .and(header("x-reference-id", "3f1c2a9e-0d7b-4a55-9a3e-1f2b3c4d5e6f"))
            .and(header("x-target-environment", "mtnuganda"))
            .and(header("ocp-apim-subscription-key", "sub_1"))
            .and(body_json(json!({
                "amount": "250.5",
                "currency": "EUR",
                "externalId": "order_7",
                "payer": {"partyIdType": "MSISDN", "partyId": "46733123453"},
                "payerMessage": "Payment request",
                "payeeNote": "Thank you for your payment",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let response = adapter(&server).send_payment(&transaction()).await.unwrap();
        assert_eq!(response.transaction_id, "3f1c2a9e-0d7b-4a55-9a3e-1f2b3c4d5e6f");
        assert!(response.is_pending());
        assert!(response.raw_response.is_null());
    }

    #[tokio::test]
    async fn test_status_and_detail() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/transaction/status/order_7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "amount": "250.50",
                "currency": "EUR",
                "financialTransactionId": "363440463",
                "externalId": "order_7",
                "payer": {"partyIdType": "MSISDN", "partyId": "46733123453"},
                "status": "SUCCESSFUL",
            })))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        let status = adapter.check_status("order_7").await.unwrap();
        assert_eq!(status.transaction_id, "363440463");
        assert_eq!(status.status, TransactionStatus::Successful);
        assert_eq!(status.amount, Decimal::new(25050, 2));

        let detail = adapter.transaction_detail("order_7").await.unwrap();
        assert_eq!(detail.reference, "order_7");
        assert_eq!(detail.customer_phone(), Some("46733123453"));
    }

    #[tokio::test]
    async fn test_refund_requires_amount() {
        let server = MockServer::start().await;
        let err = adapter(&server).refund("order_7", None).await.unwrap_err();
        assert!(err.is_validation());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_transaction_id_is_rejected_before_network() {
        let server = MockServer::start().await;
        let mut transaction = transaction();
        transaction.transaction_id = "  ".to_owned();
        let err = adapter(&server).send_payment(&transaction).await.unwrap_err();
        assert!(matches!(
            err,
            SwitchError::Validation { field: Some(ref f), .. } if f == "transaction_id"
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refund() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/disbursement/refund"))
            .and(header("x-reference-id", "refund_order_7"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let refund = adapter(&server)
            .refund("order_7", Some(Decimal::from(100)))
            .await
            .unwrap();
        assert_eq!(refund.reference, "refund_order_7");
        assert_eq!(refund.status, TransactionStatus::Pending);
        assert_eq!(refund.amount, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_payment_error_carries_status_and_body() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/collection/request-to-pay"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "RESOURCE_ALREADY_EXIST",
                "message": "Duplicated reference id.",
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).send_payment(&transaction()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(http::StatusCode::CONFLICT));
        assert_eq!(err.raw_response().unwrap()["code"], "RESOURCE_ALREADY_EXIST");
    }

    #[test]
    fn test_webhook() {
        let adapter = MtnMomoAdapter::new(&ProviderConfig::new(credentials())).unwrap();
        let body = br#"{"externalId":"order_7","amount":"250.50","currency":"EUR","status":"FAILED","payer":{"partyId":"46733123453"}}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"hook").unwrap();
        mac.update(body);
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-signature",
            HeaderValue::from_str(&hex::encode(mac.finalize().into_bytes())).unwrap(),
        );

        let event = adapter.parse_webhook(body, &headers).unwrap();
        assert_eq!(event.transaction_id, "order_7");
        assert_eq!(event.status, TransactionStatus::Failed);
        assert_eq!(event.context["msisdn"], "46733123453");

        assert!(adapter.parse_webhook(body, &HeaderMap::new()).is_err());
    }
}
