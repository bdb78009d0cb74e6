//! [`PaySwitch`]: one adapter per configured provider behind a single handle.

use std::collections::BTreeMap;

use http::HeaderMap;
use rust_decimal::Decimal;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::adapter::Adapter;
use crate::config::SwitchConfig;
use crate::error::SwitchError;
use crate::model::{
    PaymentResponse, ProviderId, TransactionDetail, TransactionStatusResponse, WebhookEvent,
};
use crate::registry::AdapterRegistry;

/// Facade over the adapters built from a [`SwitchConfig`].
///
/// Every operation takes an optional provider; `None` selects the default
/// provider. The facade never chooses between providers on its own.
#[derive(Debug)]
pub struct PaySwitch {
    adapters: BTreeMap<ProviderId, Box<dyn Adapter>>,
    default_provider: ProviderId,
}

impl PaySwitch {
    /// Builds one adapter per configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the configuration is invalid
    /// or an adapter lacks required credentials, and
    /// [`SwitchError::ProviderNotFound`] if a configured provider has no
    /// registered constructor.
    #[cfg_attr(feature = "telemetry", instrument(name = "payswitch.init", skip_all, err))]
    pub fn from_config(config: &SwitchConfig, registry: &AdapterRegistry) -> Result<Self, SwitchError> {
        config.validate()?;
        let mut adapters = BTreeMap::new();
        for (id, provider_config) in &config.providers {
            let adapter = registry.build(id, provider_config)?;
            if !adapter.validate_credentials() {
                return Err(SwitchError::Configuration(format!(
                    "provider '{id}' is missing required credentials"
                )));
            }
            #[cfg(feature = "telemetry")]
            debug!(provider = %id, "adapter ready");
            adapters.insert(id.clone(), adapter);
        }
        let default_provider = config
            .resolved_default()
            .cloned()
            .ok_or_else(|| SwitchError::Configuration("no providers configured".into()))?;
        Ok(Self {
            adapters,
            default_provider,
        })
    }

    /// Provider used when a call names none.
    #[must_use]
    pub const fn default_provider(&self) -> &ProviderId {
        &self.default_provider
    }

    /// Configured providers in key order.
    pub fn providers(&self) -> impl Iterator<Item = &ProviderId> {
        self.adapters.keys()
    }

    /// The adapter for `provider`, or for the default provider.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::ProviderNotFound`] if `provider` is not configured.
    pub fn adapter(&self, provider: Option<&ProviderId>) -> Result<&dyn Adapter, SwitchError> {
        let id = provider.unwrap_or(&self.default_provider);
        self.adapters
            .get(id)
            .map(Box::as_ref)
            .ok_or_else(|| SwitchError::ProviderNotFound(id.clone()))
    }

    /// See [`Adapter::send_payment`].
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub async fn send_payment(
        &self,
        provider: Option<&ProviderId>,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError> {
        self.adapter(provider)?.send_payment(transaction).await
    }

    /// See [`Adapter::check_status`].
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub async fn check_status(
        &self,
        provider: Option<&ProviderId>,
        transaction_id: &str,
    ) -> Result<TransactionStatusResponse, SwitchError> {
        self.adapter(provider)?.check_status(transaction_id).await
    }

    /// See [`Adapter::refund`].
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub async fn refund(
        &self,
        provider: Option<&ProviderId>,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError> {
        self.adapter(provider)?.refund(transaction_id, amount).await
    }

    /// See [`Adapter::cancel_transaction`].
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub async fn cancel_transaction(
        &self,
        provider: Option<&ProviderId>,
        transaction_id: &str,
    ) -> Result<bool, SwitchError> {
        self.adapter(provider)?.cancel_transaction(transaction_id).await
    }

    /// See [`Adapter::transaction_detail`].
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub async fn transaction_detail(
        &self,
        provider: Option<&ProviderId>,
        transaction_id: &str,
    ) -> Result<TransactionDetail, SwitchError> {
        self.adapter(provider)?.transaction_detail(transaction_id).await
    }

    /// See [`Adapter::parse_webhook`].
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub fn parse_webhook(
        &self,
        provider: Option<&ProviderId>,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookEvent, SwitchError> {
        self.adapter(provider)?.parse_webhook(raw_body, headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthCredential;
    use crate::config::ProviderConfig;
    use crate::model::Currency;
    use crate::test_support::StubAdapter;

    fn registry() -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry
            .register("alpha", StubAdapter::boxed)
            .unwrap()
            .register("beta", StubAdapter::boxed)
            .unwrap();
        registry
    }

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig::new(AuthCredential::default().with_api_key("k")).with_option("name", name)
    }

    #[tokio::test]
    async fn test_routes_to_default_and_named_providers() {
        let config = SwitchConfig::default()
            .with_provider("alpha", provider("alpha"))
            .with_provider("beta", provider("beta"))
            .with_default_provider("beta");
        let switch = PaySwitch::from_config(&config, &registry()).unwrap();
        assert_eq!(switch.default_provider().as_str(), "beta");
        assert_eq!(switch.providers().count(), 2);

        let tx = TransactionDetail::new("tx_1", "ref_1", Decimal::from(10), Currency::EUR);
        let response = switch.send_payment(None, &tx).await.unwrap();
        assert_eq!(response.transaction_id, "beta-tx_1");

        let alpha = ProviderId::new("alpha");
        let response = switch.send_payment(Some(&alpha), &tx).await.unwrap();
        assert_eq!(response.provider, alpha);
    }

    #[tokio::test]
    async fn test_unknown_provider_at_call_time() {
        let config = SwitchConfig::default().with_provider("alpha", provider("alpha"));
        let switch = PaySwitch::from_config(&config, &registry()).unwrap();
        let err = switch
            .check_status(Some(&ProviderId::new("gamma")), "tx")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::ProviderNotFound(_)));
    }

    #[test]
    fn test_unregistered_provider_in_config() {
        let config = SwitchConfig::default().with_provider("gamma", provider("gamma"));
        let err = PaySwitch::from_config(&config, &registry()).unwrap_err();
        assert!(matches!(err, SwitchError::ProviderNotFound(_)));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = SwitchConfig::default().with_provider("alpha", ProviderConfig::default());
        let err = PaySwitch::from_config(&config, &registry()).unwrap_err();
        assert!(matches!(err, SwitchError::Configuration(ref m) if m.contains("credentials")));
    }
}
