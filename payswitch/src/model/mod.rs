//! Canonical value types exchanged between callers and adapters.
//!
//! Query operations always return fresh values; nothing in this module is
//! mutated in place by an adapter.

mod currency;
mod provider;
mod transaction;

pub use currency::{Currency, UnknownCurrency};
pub use provider::ProviderId;
pub use transaction::{
    CustomerInfo, Metadata, PaymentResponse, TransactionDetail, TransactionStatusResponse,
    TransactionType, WebhookEvent,
};
