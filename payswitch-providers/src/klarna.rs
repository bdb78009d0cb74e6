//! Klarna Payments adapter.
//!
//! Authentication is static HTTP basic (`api_username:api_key`). Amounts are
//! sent in minor units. Notifications are signed with HMAC-SHA256 over the
//! canonical JSON rendering of the body, in the `klarna-signature` header.

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

/// Klarna playground API root (Europe).
pub const SANDBOX_URL: &str = "https://api.playground.klarna.com";
/// Klarna production API root (Europe).
pub const PRODUCTION_URL: &str = "https://api.klarna.com";

const SIGNATURE_HEADERS: &[&str] = &["klarna-signature"];

const STATUSES: StatusMap = StatusMap::new(&[
    ("AUTHORIZED", TransactionStatus::Pending),
    ("CAPTURED", TransactionStatus::Successful),
    ("CANCELLED", TransactionStatus::Cancelled),
    ("REFUNDED", TransactionStatus::Refunded),
    ("FAILED", TransactionStatus::Failed),
]);

const DEFAULT_LOCALE: &str = "en-SE";
const DEFAULT_PURCHASE_COUNTRY: &str = "SE";

/// Klarna Payments API adapter.
#[derive(Debug)]
pub struct KlarnaAdapter {
    auth: AuthCache,
    rules: CurrencyRules,
    verifier: WebhookVerifier,
    has_credentials: bool,
    callback_url: Option<String>,
    locale: String,
    purchase_country: String,
    default_currency: Currency,
}

impl KlarnaAdapter {
    /// Registry key.
    pub const ID: &'static str = "klarna";

    /// Builds the adapter from provider configuration.
    ///
    /// Recognized options: `locale` (default `en-SE`) and
    /// `purchase_country` (default `SE`, used when the customer has none).
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
        let source = StaticToken::basic(
            credentials.field("username").unwrap_or_default(),
            credentials.field("api_key").unwrap_or_default(),
        );
        let verifier = WebhookVerifier::new(
            SignatureAlgorithm::HmacSha256,
            SignedBody::CanonicalJson,
            SIGNATURE_HEADERS,
        )
        .with_secret(credentials.field("webhook_secret"))
        .with_unsigned_policy(config.unsigned_policy());

        Ok(Self {
            auth: AuthCache::new(source, transport),
            rules: Self::currency_bounds(),
            verifier,
            has_credentials: credentials.has_all(&["username", "api_key"]),
            callback_url: config.callback_url.clone(),
            locale: config.option("locale").unwrap_or(DEFAULT_LOCALE).to_owned(),
            purchase_country: config
                .option("purchase_country")
                .unwrap_or(DEFAULT_PURCHASE_COUNTRY)
                .to_owned(),
            default_currency: config.default_currency.unwrap_or(Currency::EUR),
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

    fn currency_bounds() -> CurrencyRules {
        CurrencyRules::new([
            CurrencyBounds::whole(Currency::EUR, 1, 100_000),
            CurrencyBounds::whole(Currency::USD, 1, 100_000),
            CurrencyBounds::whole(Currency::GBP, 1, 100_000),
            CurrencyBounds::whole(Currency::SEK, 10, 1_000_000),
            CurrencyBounds::whole(Currency::NOK, 10, 1_000_000),
            CurrencyBounds::whole(Currency::DKK, 10, 1_000_000),
        ])
    }

    fn headers(token: &AuthToken) -> Result<HeaderMap, SwitchError> {
        let mut headers = json_headers();
        headers.insert(AUTHORIZATION, token.header_value("")?);
        Ok(headers)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
    ) -> Result<ProviderResponse, SwitchError> {
        self.auth.send(method, path, body, context, Self::headers).await
    }

    /// Order amounts are minor units of the order's purchase currency.
    fn order_amount(&self, body: &Value, pointer: &str) -> Result<(Decimal, Currency), SwitchError> {
        let currency = extract::currency_at(body, "/purchase_currency", self.default_currency, "klarna order")?;
        let minor = extract::required_decimal_at(body, pointer, "klarna order")?;
        Ok((amount::from_minor_units(minor, currency.minor_unit_exponent()), currency))
    }

    async fn order(&self, order_id: &str) -> Result<Value, SwitchError> {
        let path = format!("payments/v1/orders/{order_id}");
        let response = self
            .call(Method::GET, &path, None, "GET /payments/v1/orders/{id}")
            .await?
            .into_success(format!("failed to retrieve Klarna order {order_id}"))?;
        Ok(response.body)
    }
}

#[async_trait]
impl Adapter for KlarnaAdapter {
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
        let customer = transaction.customer.clone().unwrap_or_default();
        let country = transaction
            .customer_country()
            .unwrap_or(self.purchase_country.as_str())
            .to_ascii_uppercase();

        let mut payload = json!({
            "purchase_country": country,
            "purchase_currency": transaction.currency.code(),
            "locale": self.locale,
            "order_amount": minor,
            "order_tax_amount": 0,
            "merchant_reference1": transaction.reference,
            "order_lines": [{
                "type": "digital",
                "reference": transaction.reference,
                "name": transaction.reason.as_deref().unwrap_or("Payment"),
                "quantity": 1,
                "unit_price": minor,
                "tax_rate": 0,
                "total_amount": minor,
                "total_tax_amount": 0,
            }],
            "billing_address": {
                "email": email,
                "given_name": customer.first_name,
                "family_name": customer.last_name,
                "phone": customer.phone_number,
                "country": country,
            },
        });
        if let Some(callback) = transaction.callback_url.as_ref().or(self.callback_url.as_ref()) {
            payload["merchant_urls"] = json!({
                "confirmation": callback,
                "notification": callback,
            });
        }
        Ok(payload)
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.klarna.send_payment", skip_all, err, fields(reference = %transaction.reference))
    )]
    async fn send_payment(
        &self,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError> {
        let payload = self.format_transaction(transaction)?;
        let response = self
            .call(Method::POST, "payments/v1/sessions", Some(&payload), "POST /payments/v1/sessions")
            .await?
            .into_success("Klarna payment initiation failed")?;
        let body = response.body;
        let session_id = extract::required_string_at(&body, "/session_id", "klarna session")?;

        Ok(PaymentResponse {
            transaction_id: session_id,
            reference: transaction.reference.clone(),
            provider: self.provider(),
            status: TransactionStatus::Pending,
            amount: transaction.amount,
            currency: transaction.currency,
            payment_link: extract::string_at(&body, "/redirect_url"),
            transaction_token: extract::string_at(&body, "/client_token"),
            customer: transaction.customer.clone(),
            created_at: Some(Utc::now()),
            expires_at: extract::datetime_at(&body, "/expires_at"),
            metadata: body_metadata(&body),
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.klarna.check_status", skip_all, err, fields(order_id = order_id))
    )]
    async fn check_status(&self, order_id: &str) -> Result<TransactionStatusResponse, SwitchError> {
        let body = self.order(order_id).await?;
        let (amount, _) = self.order_amount(&body, "/order_amount")?;

        Ok(TransactionStatusResponse {
            transaction_id: order_id.to_owned(),
            provider: self.provider(),
            status: STATUSES.normalize_opt(extract::str_at(&body, "/status")),
            amount,
            data: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.klarna.refund", skip_all, err, fields(order_id = order_id))
    )]
    async fn refund(
        &self,
        order_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError> {
        let mut payload = json!({ "description": "Refund" });
        // A partial refund is expressed in the order's purchase currency.
        let order_currency = match amount {
            Some(amount) => {
                if amount <= Decimal::ZERO {
                    return Err(SwitchError::invalid_field("amount", "refund amount must be strictly positive"));
                }
                let order = self.order(order_id).await?;
                let currency =
                    extract::currency_at(&order, "/purchase_currency", self.default_currency, "klarna order")?;
                payload["refunded_amount"] =
                    json!(amount::to_minor_units(amount, currency.minor_unit_exponent())?);
                Some(currency)
            }
            None => None,
        };
        let path = format!("payments/v1/orders/{order_id}/refunds");
        let response = self
            .call(Method::POST, &path, Some(&payload), "POST /payments/v1/orders/{id}/refunds")
            .await?
            .into_success("Klarna refund failed")?;
        let body = response.body;
        let currency = match order_currency {
            Some(currency) => currency,
            None => extract::currency_at(&body, "/currency", self.default_currency, "klarna refund")?,
        };
        let refunded = amount.unwrap_or_else(|| {
            extract::decimal_at(&body, "/refunded_amount")
                .map(|minor| amount::from_minor_units(minor, currency.minor_unit_exponent()))
                .unwrap_or_default()
        });

        Ok(PaymentResponse {
            transaction_id: order_id.to_owned(),
            reference: format!("refund-{order_id}"),
            provider: self.provider(),
            status: TransactionStatus::Refunded,
            amount: refunded,
            currency,
            payment_link: None,
            transaction_token: None,
            customer: None,
            created_at: Some(Utc::now()),
            expires_at: None,
            metadata: body_metadata(&body),
            raw_response: body,
        })
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.klarna.cancel", skip_all, err, fields(order_id = order_id))
    )]
    async fn cancel_transaction(&self, order_id: &str) -> Result<bool, SwitchError> {
        let path = format!("payments/v1/orders/{order_id}/cancel");
        self.call(Method::POST, &path, None, "POST /payments/v1/orders/{id}/cancel")
            .await?
            .into_success("Klarna cancellation failed")?;
        Ok(true)
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "payswitch.klarna.transaction_detail", skip_all, err, fields(order_id = order_id))
    )]
    async fn transaction_detail(&self, order_id: &str) -> Result<TransactionDetail, SwitchError> {
        let body = self.order(order_id).await?;
        let (amount, currency) = self.order_amount(&body, "/order_amount")?;
        let customer = CustomerInfo {
            email: extract::string_at(&body, "/billing_address/email"),
            phone_number: extract::string_at(&body, "/billing_address/phone"),
            first_name: extract::string_at(&body, "/billing_address/given_name"),
            last_name: extract::string_at(&body, "/billing_address/family_name"),
            country: extract::string_at(&body, "/billing_address/country"),
            address: extract::string_at(&body, "/billing_address/street_address"),
            city: extract::string_at(&body, "/billing_address/city"),
            postal_code: extract::string_at(&body, "/billing_address/postal_code"),
            ..CustomerInfo::default()
        };
        let reference = extract::first_string_at(&body, &["/merchant_reference1", "/order_id"])
            .unwrap_or_else(|| order_id.to_owned());

        let mut detail = TransactionDetail::new(order_id, reference, amount, currency);
        detail.status = STATUSES.normalize_opt(extract::str_at(&body, "/status"));
        detail.provider = Some(self.provider());
        detail.customer = Some(customer);
        detail.created_at = extract::datetime_at(&body, "/created_at").unwrap_or(detail.created_at);
        detail.metadata = body_metadata(&body);
        detail.raw_data = body;
        Ok(detail)
    }

    fn parse_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, SwitchError> {
        if !self.verifier.verify(raw_body, headers) {
            return Err(SwitchError::webhook("invalid Klarna webhook signature"));
        }
        let payload = adapter::webhook_body(raw_body)?;
        let transaction_id = extract::required_string_at(&payload, "/order_id", "klarna webhook")?;
        let currency = extract::currency_at(&payload, "/currency", self.default_currency, "klarna webhook")?;

        Ok(WebhookEvent {
            event_type: extract::string_at(&payload, "/event_type")
                .unwrap_or_else(|| "payment.update".to_owned()),
            provider: self.provider(),
            transaction_id,
            status: STATUSES.normalize_opt(extract::str_at(&payload, "/status")),
            amount: extract::required_decimal_at(&payload, "/amount", "klarna webhook")?,
            currency,
            received_at: Utc::now(),
            metadata: Metadata::new(),
            context: Metadata::new(),
            raw_data: payload,
        })
    }
}
