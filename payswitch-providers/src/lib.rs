#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Concrete payment-provider adapters for payswitch.
//!
//! Each provider lives in its own module behind a cargo feature of the same
//! name; all are enabled by default.
//!
//! | Key        | Adapter                                   | Family            |
//! |------------|-------------------------------------------|-------------------|
//! | `klarna`   | [`klarna::KlarnaAdapter`]                 | card / BNPL       |
//! | `paystack` | [`paystack::PaystackAdapter`]             | card gateway      |
//! | `airtel`   | [`airtel::AirtelMoneyAdapter`]            | mobile money      |
//! | `mtn`      | [`mtn::MtnMomoAdapter`]                   | mobile money      |
//! | `orange`   | [`orange::OrangeMoneyAdapter`]            | mobile money      |
//!
//! # Example
//!
//! ```no_run
//! use payswitch::PaySwitch;
//! use payswitch::config::SwitchConfig;
//!
//! # fn main() -> Result<(), payswitch::SwitchError> {
//! let registry = payswitch_providers::default_registry()?;
//! let config = SwitchConfig::load()?;
//! let switch = PaySwitch::from_config(&config, &registry)?;
//! # let _ = switch;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "airtel")]
pub mod airtel;
#[cfg(feature = "klarna")]
pub mod klarna;
#[cfg(feature = "mtn")]
pub mod mtn;
#[cfg(feature = "orange")]
pub mod orange;
#[cfg(feature = "paystack")]
pub mod paystack;

mod support;

use payswitch::{AdapterRegistry, SwitchError};

/// Registers every adapter enabled at compile time.
///
/// # Errors
///
/// Returns [`SwitchError::Configuration`] if one of the keys is already
/// present in `registry`.
pub fn register_all(registry: &mut AdapterRegistry) -> Result<(), SwitchError> {
    #[cfg(feature = "klarna")]
    registry.register(klarna::KlarnaAdapter::ID, klarna::KlarnaAdapter::boxed)?;
    #[cfg(feature = "paystack")]
    registry.register(paystack::PaystackAdapter::ID, paystack::PaystackAdapter::boxed)?;
    #[cfg(feature = "airtel")]
    registry.register(airtel::AirtelMoneyAdapter::ID, airtel::AirtelMoneyAdapter::boxed)?;
    #[cfg(feature = "mtn")]
    registry.register(mtn::MtnMomoAdapter::ID, mtn::MtnMomoAdapter::boxed)?;
    #[cfg(feature = "orange")]
    registry.register(orange::OrangeMoneyAdapter::ID, orange::OrangeMoneyAdapter::boxed)?;
    Ok(())
}

/// A registry holding every adapter enabled at compile time.
///
/// # Errors
///
/// See [`register_all`].
pub fn default_registry() -> Result<AdapterRegistry, SwitchError> {
    let mut registry = AdapterRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}
