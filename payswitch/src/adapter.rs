//! The lifecycle contract every provider integration satisfies.

use std::fmt;

use async_trait::async_trait;
use http::HeaderMap;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::amount::CurrencyRules;
use crate::error::SwitchError;
use crate::model::{
    PaymentResponse, ProviderId, TransactionDetail, TransactionStatusResponse, WebhookEvent,
};
use crate::status::TransactionStatus;

/// A payment provider integration.
///
/// Each network operation performs exactly one business exchange, preceded
/// by an authentication exchange when no valid token is cached. A 2xx answer
/// is success; anything else is [`SwitchError::Payment`] carrying the status
/// and raw body.
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    /// The provider key this adapter serves.
    fn provider(&self) -> ProviderId;

    /// Local check that every credential the provider needs is present.
    /// Never performs I/O.
    fn validate_credentials(&self) -> bool;

    /// Currencies accepted by this provider and their amount bounds.
    fn currency_rules(&self) -> &CurrencyRules;

    /// Maps one of the provider's raw status tokens to a canonical status.
    fn normalize_status(&self, raw: &str) -> TransactionStatus;

    /// Headers for an authenticated call, authenticating first if needed.
    async fn auth_headers(&self) -> Result<HeaderMap, SwitchError>;

    /// Builds the provider's payment payload.
    ///
    /// Fails with [`SwitchError::Validation`] when the amount is out of
    /// bounds, the currency is unsupported or a provider-required field is
    /// missing.
    fn format_transaction(&self, transaction: &TransactionDetail) -> Result<Value, SwitchError>;

    /// Initiates a payment.
    async fn send_payment(
        &self,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError>;

    /// Queries the current status of a transaction.
    async fn check_status(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatusResponse, SwitchError>;

    /// Refunds a transaction. `None` requests a full refund.
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError>;

    /// Cancels a transaction, returning `true` on a 2xx answer.
    ///
    /// Providers without a cancellation endpoint keep this default.
    async fn cancel_transaction(&self, transaction_id: &str) -> Result<bool, SwitchError> {
        let _ = transaction_id;
        Err(SwitchError::unsupported(self.provider(), "cancel_transaction"))
    }

    /// Fetches a transaction and rebuilds it in canonical form.
    async fn transaction_detail(&self, transaction_id: &str)
    -> Result<TransactionDetail, SwitchError>;

    /// Verifies and decodes an inbound notification.
    fn parse_webhook(&self, raw_body: &[u8], headers: &HeaderMap)
    -> Result<WebhookEvent, SwitchError>;
}

/// Customer email, or a validation error naming `customer.email`.
///
/// # Errors
///
/// Returns [`SwitchError::Validation`] when the email is absent or blank.
pub fn required_email(transaction: &TransactionDetail) -> Result<&str, SwitchError> {
    transaction
        .customer_email()
        .ok_or_else(|| SwitchError::invalid_field("customer.email", "customer email is required"))
}

/// Customer phone number reduced to its digits.
///
/// # Errors
///
/// Returns [`SwitchError::Validation`] when the number is absent or has no
/// digits.
pub fn required_msisdn(transaction: &TransactionDetail) -> Result<String, SwitchError> {
    let digits: String = transaction
        .customer_phone()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return Err(SwitchError::invalid_field(
            "customer.phone_number",
            "customer phone number is required",
        ));
    }
    Ok(digits)
}

/// Decodes a notification body after its signature has been checked.
///
/// # Errors
///
/// Returns [`SwitchError::Decode`] when the body is not JSON.
pub fn webhook_body(raw_body: &[u8]) -> Result<Value, SwitchError> {
    serde_json::from_slice(raw_body).map_err(|e| {
        SwitchError::decode(
            "webhook body",
            e.to_string(),
            Value::String(String::from_utf8_lossy(raw_body).into_owned()),
        )
    })
}
