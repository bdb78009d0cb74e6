//! Paystack adapter.
//!
//! Every call carries the secret key as a bearer token. Responses wrap their
//! payload as `{"status": bool, "message": ..., "data": ...}` and a `false`
//! status is a failure even on HTTP 200. Notifications are signed with
//! HMAC-SHA512 over the raw body in `x-paystack-signature`, keyed with the
//! secret key unless a dedicated webhook secret is configured.

use async_trait::async_trait;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use payswitch::adapter::{self, Adapter};
use payswitch::amount::{self, CurrencyBounds, CurrencyRules};
use payswitch::auth::{AuthCache, AuthToken, StaticToken};
use payswitch::config::ProviderConfig;
use payswitch::extract;
use payswitch::status::StatusMap;
use payswitch::transport::{HttpTransport, ProviderResponse};
use payswitch::webhook::{SignatureAlgorithm, SignedBody, WebhookVerifier};
use payswitch::{
    Currency, CustomerInfo, Metadata, PaymentResponse, ProviderId, SwitchError,
    TransactionDetail, TransactionStatus, TransactionStatusResponse, WebhookEvent,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::support::{body_metadata, json_headers};

/// Paystack API root. Test and live keys share it.
pub const API_URL: &str = "https://api.paystack.co";

const SIGNATURE_HEADERS: &[&str] = &["x-paystack-signature"];

const STATUSES: StatusMap = StatusMap::new(&[
    ("success", TransactionStatus::Successful),
    ("failed", TransactionStatus::Failed),
    ("abandoned", TransactionStatus::Cancelled),
    ("pending", TransactionStatus::Pending),
    ("ongoing", TransactionStatus::Pending),
    ("processing", TransactionStatus::Pending),
    ("queued", TransactionStatus::Pending),
    ("reversed", TransactionStatus::Refunded),
    ("processed", TransactionStatus::Refunded),
]);

/// Paystack API adapter.
#[derive(Debug)]
pub struct PaystackAdapter {
    auth: AuthCache,
    rules: CurrencyRules,
    verifier: WebhookVerifier,
    has_credentials: bool,
    callback_url: Option<String>,
    default_currency: Currency,
}

impl PaystackAdapter {
    /// Registry key.
    pub const ID: &'static str = "paystack";

    /// Builds the adapter from provider configuration. Sandbox and
    /// production share one host; the key decides the mode.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the base URL is invalid.
    pub fn new(config: &ProviderConfig) -> Result<Self, SwitchError> {
        let credentials = &config.credentials;
        let api_key = credentials.field("api_key").unwrap_or_default();
        let transport =
            HttpTransport::try_new(ProviderId::new(Self::ID), config.base_url_or(API_URL, API_URL))?
                .with_timeout(config.timeout());
        let verifier = WebhookVerifier::new(
            SignatureAlgorithm::HmacSha512,
            SignedBody::Raw,
            SIGNATURE_HEADERS,
        )
        .with_secret(credentials.field("webhook_secret").or(credentials.field("api_key")))
        .with_unsigned_policy(config.unsigned_policy());

        Ok(Self {
            auth: AuthCache::new(StaticToken::bearer(api_key), transport),
            rules: CurrencyRules::new([
                CurrencyBounds::whole(Currency::NGN, 50, 10_000_000),
                CurrencyBounds::new(Currency::GHS, Decimal::new(10, 2), Decimal::from(10_000_000)),
                CurrencyBounds::whole(Currency::USD, 2, 10_000_000),
            ]),
            verifier,
            has_credentials: credentials.has_all(&["api_key"]),
            callback_url: config.callback_url.clone(),
            default_currency: config.default_currency.unwrap_or(Currency::NGN),
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

    fn headers(token: &AuthToken) -> Result<HeaderMap, SwitchError> {
        let mut headers = json_headers();
        headers.insert(AUTHORIZATION, token.header_value("")?);
        Ok(headers)
    }

    /// One exchange, with the `status: false` envelope treated as failure.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
        failure: &str,
    ) -> Result<Value, SwitchError> {
        let response: ProviderResponse = self
            .auth
            .send(method, path, body, context, Self::headers)
            .await?
            .into_success(failure)?;
        if response.body.get("status").and_then(Value::as_bool) != Some(true) {
            return Err(SwitchError::payment(
                format!(
                    "{failure}: {}",
                    extract::str_at(&response.body, "/message").unwrap_or("request not accepted")
                ),
                response.status,
                response.body,
            ));
        }
        Ok(response.body)
    }
}

/// `/amount` of a payload, converted from minor units.
fn major_amount(data: &Value, currency: Currency) -> Decimal {
    extract::decimal_at(data, "/amount")
        .map(|minor| amount::from_minor_units(minor, currency.minor_unit_exponent()))
        .unwrap_or_default()
}

#[async_trait]
impl Adapter for PaystackAdapter {
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
        let email = adapter::required_email(transaction)?;
        let minor = amount::to_minor_units(transaction.amount, transaction.currency.minor_unit_exponent())?;
        let mut payload = json!({
            "amount": minor,
            "email": email,
            "currency": transaction.currency.code(),
            "reference": transaction.reference,
            "metadata": transaction.metadata,
        });
        if let Some(callback) = transaction.callback_url.as_ref().or(self.callback_url.as_ref()) {
            payload["callback_url"] = json!(callback);
        }
        Ok(payload)
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.paystack.send_payment", skip_all, err, fields(reference = %transaction.reference))
    )]
    async fn send_payment(
        &self,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError> {
        let payload = self.format_transaction(transaction)?;
        let body = self
            .call(
                Method::POST,
                "transaction/initialize",
                Some(&payload),
                "POST /transaction/initialize",
                "Paystack payment initialization failed",
            )
            .await?;

        Ok(PaymentResponse {
            transaction_id: extract::string_at(&body, "/data/reference")
                .unwrap_or_else(|| transaction.reference.clone()),
            reference: transaction.reference.clone(),
            provider: self.provider(),
            status: TransactionStatus::Pending,
            amount: transaction.amount,
            currency: transaction.currency,
            payment_link: extract::string_at(&body, "/data/authorization_url"),
            transaction_token: extract::string_at(&body, "/data/access_code"),
            customer: transaction.customer.clone(),
            created_at: Some(Utc::now()),
            expires_at: None,
            metadata: extract::object_at(&body, "/data"),
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.paystack.check_status", skip_all, err, fields(reference = reference))
    )]
    async fn check_status(&self, reference: &str) -> Result<TransactionStatusResponse, SwitchError> {
        let path = format!("transaction/verify/{reference}");
        let body = self
            .call(
                Method::GET,
                &path,
                None,
                "GET /transaction/verify/{reference}",
                "Paystack transaction verification failed",
            )
            .await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let currency = extract::currency_at(&data, "/currency", self.default_currency, "paystack verify")?;

        Ok(TransactionStatusResponse {
            transaction_id: extract::string_at(&data, "/id").unwrap_or_else(|| reference.to_owned()),
            provider: self.provider(),
            status: STATUSES.normalize_opt(extract::str_at(&data, "/status")),
            amount: major_amount(&data, currency),
            data: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.paystack.refund", skip_all, err, fields(transaction = transaction_id))
    )]
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError> {
        let mut payload = json!({ "transaction": transaction_id });
        if let Some(amount) = amount {
            if amount <= Decimal::ZERO {
                return Err(SwitchError::invalid_field("amount", "refund amount must be strictly positive"));
            }
            payload["amount"] = json!(amount::to_minor_units(
                amount,
                self.default_currency.minor_unit_exponent()
            )?);
        }
        let body = self
            .call(Method::POST, "refund", Some(&payload), "POST /refund", "Paystack refund failed")
            .await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let currency = extract::currency_at(&data, "/currency", self.default_currency, "paystack refund")?;
        let refunded = amount.unwrap_or_else(|| major_amount(&data, currency));

        Ok(PaymentResponse {
            transaction_id: transaction_id.to_owned(),
            reference: extract::string_at(&data, "/transaction/reference")
                .unwrap_or_else(|| format!("refund-{transaction_id}")),
            provider: self.provider(),
            status: STATUSES.normalize_opt(extract::str_at(&data, "/status")),
            amount: refunded,
            currency,
            payment_link: None,
            transaction_token: None,
            customer: None,
            created_at: extract::datetime_at(&data, "/createdAt"),
            expires_at: None,
            metadata: body_metadata(&data),
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.paystack.transaction_detail", skip_all, err, fields(id = transaction_id))
    )]
    async fn transaction_detail(&self, transaction_id: &str) -> Result<TransactionDetail, SwitchError> {
        let path = format!("transaction/{transaction_id}");
        let body = self
            .call(
                Method::GET,
                &path,
                None,
                "GET /transaction/{id}",
                "failed to retrieve Paystack transaction",
            )
            .await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let currency = extract::currency_at(&data, "/currency", self.default_currency, "paystack transaction")?;
        let customer = CustomerInfo {
            email: extract::string_at(&data, "/customer/email"),
            phone_number: extract::string_at(&data, "/customer/phone"),
            first_name: extract::string_at(&data, "/customer/first_name"),
            last_name: extract::string_at(&data, "/customer/last_name"),
            id: extract::string_at(&data, "/customer/customer_code"),
            ..CustomerInfo::default()
        };

        let mut detail = TransactionDetail::new(
            extract::string_at(&data, "/id").unwrap_or_else(|| transaction_id.to_owned()),
            extract::string_at(&data, "/reference").unwrap_or_else(|| transaction_id.to_owned()),
            major_amount(&data, currency),
            currency,
        );
        detail.status = STATUSES.normalize_opt(extract::str_at(&data, "/status"));
        detail.provider = Some(self.provider());
        detail.customer = Some(customer);
        detail.reason = extract::string_at(&data, "/gateway_response");
        detail.created_at = extract::datetime_at(&data, "/created_at").unwrap_or(detail.created_at);
        detail.completed_at = extract::datetime_at(&data, "/paid_at");
        detail.metadata = extract::object_at(&data, "/metadata");
        detail.raw_data = body;
        Ok(detail)
    }

    fn parse_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, SwitchError> {
        if !self.verifier.verify(raw_body, headers) {
            return Err(SwitchError::webhook("invalid Paystack webhook signature"));
        }
        let payload = adapter::webhook_body(raw_body)?;
        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        let currency = extract::currency_at(&data, "/currency", self.default_currency, "paystack webhook")?;
        let mut metadata = Metadata::new();
        if let Some(email) = extract::string_at(&data, "/customer/email") {
            metadata.insert("customer_email".to_owned(), Value::String(email));
        }

        Ok(WebhookEvent {
            event_type: extract::string_at(&payload, "/event").unwrap_or_else(|| "unknown".to_owned()),
            provider: self.provider(),
            transaction_id: extract::required_string_at(&data, "/reference", "paystack webhook")?,
            status: STATUSES.normalize_opt(extract::str_at(&data, "/status")),
            amount: major_amount(&data, currency),
            currency,
            received_at: Utc::now(),
            metadata,
            context: Metadata::new(),
            raw_data: payload,
        })
    }
}
