use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Currency, ProviderId};
use crate::status::TransactionStatus;

/// Free-form key/value data attached to transactions and events.
pub type Metadata = serde_json::Map<String, Value>;

/// Kind of money movement a transaction represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Customer pays the merchant.
    #[default]
    Payment,
    /// Funds deposited into a wallet.
    Deposit,
    /// Funds withdrawn from a wallet.
    Withdrawal,
    /// Money returned to the customer.
    Refund,
    /// Wallet-to-wallet transfer.
    Transfer,
}

/// Customer details. Every field is optional here; adapters enforce what
/// their provider requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number in any format; adapters that need an MSISDN keep the digits only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// ISO 3166 alpha-2 country code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// City.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Postal code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// The provider's own identifier for this customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provider-specific extras.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl CustomerInfo {
    /// Sets `email`.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets `phone_number`.
    #[must_use]
    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Sets the given and family names.
    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Sets `country`.
    #[must_use]
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Returns `true` if no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A transaction as submitted by the caller, or as rebuilt from a provider
/// detail query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetail {
    /// Caller-side transaction identifier.
    pub transaction_id: String,
    /// Merchant-side reference, echoed back by most providers.
    pub reference: String,
    /// Amount in major units.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Lifecycle status. New transactions are pending.
    #[serde(default)]
    pub status: TransactionStatus,
    /// Kind of money movement.
    #[serde(default)]
    pub transaction_type: TransactionType,
    /// Provider that handled the transaction, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    /// The paying customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerInfo>,
    /// Payment description, or the failure reason reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Notification URL for this transaction. Overrides the provider config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// When the provider settled the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form data sent along with the payment.
    #[serde(default)]
    pub metadata: Metadata,
    /// Provider payload this value was built from, if any.
    #[serde(default)]
    pub raw_data: Value,
}

impl TransactionDetail {
    /// Creates a pending payment with the current time as creation timestamp.
    #[must_use]
    pub fn new(
        transaction_id: impl Into<String>,
        reference: impl Into<String>,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            reference: reference.into(),
            amount,
            currency,
            status: TransactionStatus::Pending,
            transaction_type: TransactionType::Payment,
            provider: None,
            customer: None,
            reason: None,
            callback_url: None,
            created_at: Utc::now(),
            updated_at: None,
            completed_at: None,
            metadata: Metadata::new(),
            raw_data: Value::Null,
        }
    }

    /// Sets `customer`.
    #[must_use]
    pub fn with_customer(mut self, customer: CustomerInfo) -> Self {
        self.customer = Some(customer);
        self
    }

    /// Sets `reason`.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets `callback_url`.
    #[must_use]
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets `transaction_type`.
    #[must_use]
    pub const fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Customer email, if present and non-empty.
    #[must_use]
    pub fn customer_email(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .filter(|e| !e.trim().is_empty())
    }

    /// Customer phone number, if present and non-empty.
    #[must_use]
    pub fn customer_phone(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .and_then(|c| c.phone_number.as_deref())
            .filter(|p| !p.trim().is_empty())
    }

    /// Customer country, if present and non-empty.
    #[must_use]
    pub fn customer_country(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .and_then(|c| c.country.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Normalized result of a send, refund or similar operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Identifier of the transaction, as known to the caller or provider.
    pub transaction_id: String,
    /// Merchant or provider reference.
    pub reference: String,
    /// Provider that answered.
    pub provider: ProviderId,
    /// Normalized status.
    pub status: TransactionStatus,
    /// Amount in major units.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Hosted page the customer is redirected to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    /// Provider token for client-side flows (access code or client token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_token: Option<String>,
    /// Customer details echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerInfo>,
    /// When the provider created the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the payment link or session stops being usable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Selected provider fields worth surfacing.
    #[serde(default)]
    pub metadata: Metadata,
    /// The full decoded provider body.
    #[serde(default)]
    pub raw_response: Value,
}

impl PaymentResponse {
    /// Returns `true` for [`TransactionStatus::Successful`].
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Successful
    }

    /// Returns `true` for [`TransactionStatus::Pending`].
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Returns `true` for [`TransactionStatus::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == TransactionStatus::Failed
    }
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    /// Identifier the provider reported, or the one queried.
    pub transaction_id: String,
    /// Provider that answered.
    pub provider: ProviderId,
    /// Normalized status.
    pub status: TransactionStatus,
    /// Amount in major units, zero when the provider omits it.
    pub amount: Decimal,
    /// The full decoded provider body.
    #[serde(default)]
    pub data: Value,
}

/// A verified, decoded inbound notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Provider event name, e.g. `charge.success`.
    pub event_type: String,
    /// Provider that sent the notification.
    pub provider: ProviderId,
    /// Transaction the notification is about.
    pub transaction_id: String,
    /// Normalized status.
    pub status: TransactionStatus,
    /// Amount as reported in the notification.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// When the notification was parsed.
    pub received_at: DateTime<Utc>,
    /// The notification body exactly as decoded.
    pub raw_data: Value,
    /// Selected provider fields worth surfacing.
    #[serde(default)]
    pub metadata: Metadata,
    /// Extra context such as the customer or channel.
    #[serde(default)]
    pub context: Metadata,
}
