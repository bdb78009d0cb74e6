#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core contract for the payswitch payment adapter layer.
//!
//! This crate defines what every payment-provider integration must look like,
//! independent of the provider's authentication scheme, payload shape, status
//! vocabulary or webhook signing algorithm. Concrete providers live in the
//! `payswitch-providers` crate.
//!
//! # Overview
//!
//! A caller builds an [`AdapterRegistry`](registry::AdapterRegistry) during
//! startup, resolves an [`Adapter`](adapter::Adapter) for a provider key and
//! invokes contract operations on it. Each operation obtains headers from the
//! adapter's [`AuthCache`](auth::AuthCache), performs one exchange through
//! [`HttpTransport`](transport::HttpTransport) and normalizes the result into
//! the [`model`] types. Inbound webhooks go through a
//! [`WebhookVerifier`](webhook::WebhookVerifier) before they are decoded.
//!
//! # Modules
//!
//! - [`adapter`] - The async adapter trait every provider implements
//! - [`amount`] - Currency bounds and minor-unit conversion
//! - [`auth`] - Credentials, tokens and the single-flight token cache
//! - [`client`] - [`PaySwitch`](client::PaySwitch), a facade over configured adapters
//! - [`config`] - Serde configuration with TOML loading
//! - [`error`] - The [`SwitchError`](error::SwitchError) taxonomy
//! - [`extract`] - Lenient accessors for provider JSON bodies
//! - [`model`] - Canonical transaction, response and webhook types
//! - [`registry`] - Provider key to adapter constructor table
//! - [`status`] - Canonical status enumeration and per-provider tables
//! - [`transport`] - Single-exchange HTTP helper around `reqwest`
//! - [`webhook`] - HMAC signature verification for inbound notifications
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation (on by default)

pub mod adapter;
pub mod amount;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod registry;
pub mod status;
pub mod transport;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use adapter::Adapter;
pub use client::PaySwitch;
pub use error::SwitchError;
pub use model::{
    Currency, CustomerInfo, Metadata, PaymentResponse, ProviderId, TransactionDetail,
    TransactionStatusResponse, TransactionType, WebhookEvent,
};
pub use registry::AdapterRegistry;
pub use status::TransactionStatus;
