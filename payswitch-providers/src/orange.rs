//! Orange Money merchant-payment adapter.
//!
//! The API root depends on the merchant's country (`country_code` option,
//! `ci` by default): `https://api.orange.{cc}/` in production and
//! `https://sandbox-api.orange.{cc}/` in the sandbox. An `X-AUTH-TOKEN` is
//! obtained by posting the merchant code and API key to `api/token`.
//! Besides single payments the adapter offers [`OrangeMoneyAdapter::send_bulk_payments`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use http::header::HeaderName;
use http::{HeaderMap, Method, StatusCode};
use payswitch::adapter::{self, Adapter};
use payswitch::amount::{self, CurrencyBounds, CurrencyRules};
use payswitch::auth::{self, AuthCache, AuthToken, TokenSource};
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
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::support::json_headers;

const DEFAULT_COUNTRY_CODE: &str = "ci";
const TOKEN_PATH: &str = "api/token";

const SIGNATURE_HEADERS: &[&str] = &["x-signature"];

const STATUSES: StatusMap = StatusMap::new(&[
    ("SUCCESS", TransactionStatus::Successful),
    ("SUCCESSFUL", TransactionStatus::Successful),
    ("FAILED", TransactionStatus::Failed),
    ("EXPIRED", TransactionStatus::Failed),
    ("PENDING", TransactionStatus::Pending),
    ("INITIATED", TransactionStatus::Pending),
    ("CANCELLED", TransactionStatus::Cancelled),
    ("REFUNDED", TransactionStatus::Refunded),
]);

const X_AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");

/// Merchant-code/API-key exchange for an `X-AUTH-TOKEN`.
///
/// Orange does not announce a lifetime, so the token is kept until a call
/// is rejected with 401/403.
pub struct MerchantTokenSource {
    merchant_code: String,
    api_key: String,
}

impl MerchantTokenSource {
    /// Exchanges `merchant_code` and `api_key` on every renewal.
    #[must_use]
    pub fn new(merchant_code: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            merchant_code: merchant_code.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for MerchantTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantTokenSource")
            .field("merchant_code", &self.merchant_code)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenSource for MerchantTokenSource {
    async fn fetch(&self, transport: &HttpTransport) -> Result<AuthToken, SwitchError> {
        let body = json!({
            "merchant_code": self.merchant_code,
            "api_key": self.api_key,
        });
        let response = transport
            .post_json(TOKEN_PATH, json_headers(), Some(&body), "POST /api/token")
            .await
            .map_err(auth::handshake_failure)?;
        auth::parse_token_response(response, &["/token"], None, Duration::ZERO)
    }
}

/// One payee of a bulk payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkPayment {
    /// Payee phone number.
    pub phone_number: String,
    /// Amount in major units.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
}

impl BulkPayment {
    /// One payee.
    #[must_use]
    pub fn new(phone_number: impl Into<String>, amount: Decimal, currency: Currency) -> Self {
        Self {
            phone_number: phone_number.into(),
            amount,
            currency,
        }
    }
}

/// Outcome of [`OrangeMoneyAdapter::send_bulk_payments`].
#[derive(Debug, Clone, PartialEq)]
pub struct BulkPaymentResponse {
    /// Reference of the submitted batch.
    pub batch_reference: String,
    /// Always `orange`.
    pub provider: ProviderId,
    /// Normalized batch status.
    pub status: TransactionStatus,
    /// Number of payees submitted.
    pub count: usize,
    /// HTTP status of the batch submission.
    pub http_status: StatusCode,
    /// The full decoded provider body.
    pub raw_response: Value,
}

/// Orange Money adapter.
#[derive(Debug)]
pub struct OrangeMoneyAdapter {
    auth: AuthCache,
    rules: CurrencyRules,
    verifier: WebhookVerifier,
    has_credentials: bool,
    merchant_code: String,
    currency: Currency,
}

impl OrangeMoneyAdapter {
    /// Registry key.
    pub const ID: &'static str = "orange";

    /// Builds the adapter, deriving the API root from `country_code` unless
    /// `base_url` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the resulting URL is invalid.
    pub fn new(config: &ProviderConfig) -> Result<Self, SwitchError> {
        let credentials = &config.credentials;
        let country_code = config
            .option("country_code")
            .unwrap_or(DEFAULT_COUNTRY_CODE)
            .to_ascii_lowercase();
        let sandbox = format!("https://sandbox-api.orange.{country_code}/");
        let production = format!("https://api.orange.{country_code}/");
        let transport =
            HttpTransport::try_new(ProviderId::new(Self::ID), config.base_url_or(&sandbox, &production))?
                .with_timeout(config.timeout());

        let merchant_code = credentials.field("merchant_code").unwrap_or_default().to_owned();
        let source = MerchantTokenSource::new(
            merchant_code.clone(),
            credentials.field("api_key").unwrap_or_default(),
        );
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
                CurrencyBounds::whole(Currency::XOF, 100, 1_000_000),
                CurrencyBounds::whole(Currency::XAF, 100, 1_000_000),
                CurrencyBounds::whole(Currency::GNF, 1_000, 10_000_000),
            ]),
            verifier,
            has_credentials: credentials.has_all(&["merchant_code", "api_key"]),
            merchant_code,
            currency: config.default_currency.unwrap_or(Currency::XOF),
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

    /// The API root requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.auth.transport().base_url().as_str()
    }

    fn headers(token: &AuthToken) -> Result<HeaderMap, SwitchError> {
        let mut headers = json_headers();
        headers.insert(X_AUTH_TOKEN, token.header_value("")?);
        Ok(headers)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
        failure: String,
    ) -> Result<(StatusCode, Value), SwitchError> {
        let response = self
            .auth
            .send(method, path, body, context, Self::headers)
            .await?
            .into_success(failure)?;
        Ok((response.status, response.body))
    }

    async fn status_body(&self, reference: &str) -> Result<Value, SwitchError> {
        let path = format!("api/transaction/status/{reference}");
        let (_, body) = self
            .call(
                Method::GET,
                &path,
                None,
                "GET /api/transaction/status/{reference}",
                format!("failed to retrieve Orange Money transaction {reference}"),
            )
            .await?;
        Ok(body)
    }

    /// Pays many subscribers in one request.
    ///
    /// Every item is checked against the currency rules before anything is
    /// sent, so an invalid item aborts the whole batch.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Validation`] for an empty batch, a blank batch
    /// reference or an invalid item, and [`SwitchError::Payment`] when the
    /// batch is refused.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.orange.bulk", skip_all, err, fields(batch = batch_reference, count = payments.len()))
    )]
    pub async fn send_bulk_payments(
        &self,
        payments: &[BulkPayment],
        batch_reference: &str,
    ) -> Result<BulkPaymentResponse, SwitchError> {
        if batch_reference.trim().is_empty() {
            return Err(SwitchError::invalid_field("batch_reference", "batch reference is required"));
        }
        if payments.is_empty() {
            return Err(SwitchError::invalid_field("transactions", "bulk payment needs at least one payee"));
        }
        let mut transactions = Vec::with_capacity(payments.len());
        for (index, payment) in payments.iter().enumerate() {
            self.rules.validate(payment.amount, payment.currency)?;
            let msisdn: String = payment.phone_number.chars().filter(char::is_ascii_digit).collect();
            if msisdn.is_empty() {
                return Err(SwitchError::invalid_field(
                    format!("transactions[{index}].phone_number"),
                    "payee phone number is required",
                ));
            }
            transactions.push(json!({
                "customer_msisdn": msisdn,
                "amount": amount::amount_to_json(payment.amount),
                "currency": payment.currency.code(),
            }));
        }
        let payload = json!({
            "merchant_code": self.merchant_code,
            "batch_reference": batch_reference,
            "transactions": transactions,
        });
        let (http_status, body) = self
            .call(
                Method::POST,
                "api/bulkpay",
                Some(&payload),
                "POST /api/bulkpay",
                format!("Orange Money bulk payment {batch_reference} failed"),
            )
            .await?;

        Ok(BulkPaymentResponse {
            batch_reference: batch_reference.to_owned(),
            provider: self.provider(),
            status: match STATUSES.normalize_opt(extract::str_at(&body, "/status")) {
                TransactionStatus::Unknown => TransactionStatus::Pending,
                status => status,
            },
            count: payments.len(),
            http_status,
            raw_response: body,
        })
    }
}

#[async_trait]
impl Adapter for OrangeMoneyAdapter {
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
        Self::headers(&token)
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> Result<Value, SwitchError> {
        self.rules.validate(transaction.amount, transaction.currency)?;
        let msisdn = adapter::required_msisdn(transaction)?;
        Ok(json!({
            "merchant_code": self.merchant_code,
            "amount": amount::amount_to_json(transaction.amount),
            "currency": transaction.currency.code(),
            "customer_msisdn": msisdn,
            "order_id": transaction.reference,
        }))
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.orange.send_payment", skip_all, err, fields(reference = %transaction.reference))
    )]
    async fn send_payment(
        &self,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError> {
        let payload = self.format_transaction(transaction)?;
        let (_, body) = self
            .call(
                Method::POST,
                "api/pay",
                Some(&payload),
                "POST /api/pay",
                "Orange Money payment request failed".to_owned(),
            )
            .await?;

        Ok(PaymentResponse {
            transaction_id: extract::first_string_at(&body, &["/transaction_id", "/txnid", "/order_id"])
                .unwrap_or_else(|| transaction.reference.clone()),
            reference: transaction.reference.clone(),
            provider: self.provider(),
            status: match STATUSES.normalize_opt(extract::str_at(&body, "/status")) {
                TransactionStatus::Unknown => TransactionStatus::Pending,
                status => status,
            },
            amount: transaction.amount,
            currency: transaction.currency,
            payment_link: extract::string_at(&body, "/payment_url"),
            transaction_token: extract::string_at(&body, "/pay_token"),
            customer: transaction.customer.clone(),
            created_at: Some(Utc::now()),
            expires_at: None,
            metadata: Metadata::new(),
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.orange.check_status", skip_all, err, fields(reference = reference))
    )]
    async fn check_status(&self, reference: &str) -> Result<TransactionStatusResponse, SwitchError> {
        let body = self.status_body(reference).await?;
        Ok(TransactionStatusResponse {
            transaction_id: extract::first_string_at(&body, &["/transaction_id", "/txnid"])
                .unwrap_or_else(|| reference.to_owned()),
            provider: self.provider(),
            status: STATUSES.normalize_opt(extract::str_at(&body, "/status")),
            amount: extract::decimal_at(&body, "/amount").unwrap_or_default(),
            data: body,
        })
    }

    async fn refund(
        &self,
        _transaction_id: &str,
        _amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError> {
        Err(SwitchError::unsupported(self.provider(), "refund"))
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.orange.transaction_detail", skip_all, err, fields(reference = transaction_id))
    )]
    async fn transaction_detail(&self, transaction_id: &str) -> Result<TransactionDetail, SwitchError> {
        let body = self.status_body(transaction_id).await?;
        let customer = CustomerInfo {
            phone_number: extract::string_at(&body, "/customer_msisdn"),
            ..CustomerInfo::default()
        };
        let mut detail = TransactionDetail::new(
            extract::first_string_at(&body, &["/transaction_id", "/txnid"])
                .unwrap_or_else(|| transaction_id.to_owned()),
            extract::string_at(&body, "/order_id").unwrap_or_else(|| transaction_id.to_owned()),
            extract::decimal_at(&body, "/amount").unwrap_or_default(),
            extract::currency_at(&body, "/currency", self.currency, "orange transaction status")?,
        );
        detail.status = STATUSES.normalize_opt(extract::str_at(&body, "/status"));
        detail.provider = Some(self.provider());
        detail.customer = Some(customer);
        detail.created_at = extract::datetime_at(&body, "/created_at").unwrap_or(detail.created_at);
        detail.raw_data = body;
        Ok(detail)
    }

    fn parse_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, SwitchError> {
        if !self.verifier.verify(raw_body, headers) {
            return Err(SwitchError::webhook("invalid Orange Money webhook signature"));
        }
        let payload = adapter::webhook_body(raw_body)?;
        let mut context = Metadata::new();
        if let Some(msisdn) = extract::string_at(&payload, "/customer_msisdn") {
            context.insert("msisdn".to_owned(), Value::String(msisdn));
        }

        Ok(WebhookEvent {
            event_type: extract::string_at(&payload, "/event")
                .unwrap_or_else(|| "payment_notification".to_owned()),
            provider: self.provider(),
            transaction_id: extract::first_string_at(&payload, &["/order_id", "/transaction_id", "/txnid"])
                .ok_or_else(|| SwitchError::decode("orange webhook", "missing transaction id", payload.clone()))?,
            status: STATUSES.normalize_opt(extract::str_at(&payload, "/status")),
            amount: extract::decimal_at(&payload, "/amount").unwrap_or_default(),
            currency: extract::currency_at(&payload, "/currency", self.currency, "orange webhook")?,
            received_at: Utc::now(),
            metadata: Metadata::new(),
            context,
            raw_data: payload,
        })
    }
}
