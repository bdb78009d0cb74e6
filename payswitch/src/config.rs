//! Switch and per-provider configuration.
//!
//! Configuration is TOML. Every `$VAR` / `${VAR}` reference is expanded from
//! the process environment before parsing, so secrets can stay out of the
//! file.
//!
//! ```toml
//! default_provider = "klarna"
//!
//! [providers.klarna]
//! environment = "sandbox"
//! callback_url = "https://shop.example.com/hooks/klarna"
//!
//! [providers.klarna.credentials]
//! api_username = "$KLARNA_USERNAME"
//! api_key = "${KLARNA_API_KEY}"
//! webhook_secret = "$KLARNA_WEBHOOK_SECRET"
//! ```
//!
//! Environment variables:
//!
//! - `PAYSWITCH_CONFIG`: Path to the configuration file (default: `payswitch.toml`)
//! - `PAYSWITCH_DEFAULT_PROVIDER`: Overrides `default_provider`

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::AuthCredential;
use crate::error::SwitchError;
use crate::model::{Currency, ProviderId};
use crate::webhook::UnsignedPolicy;

/// Target environment of a provider account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Test accounts and simulated money.
    #[default]
    Sandbox,
    /// Live accounts.
    Production,
}

impl Environment {
    /// Lower-case name, as written in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

/// Settings for one provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Sandbox or production. Selects the default API root.
    #[serde(default)]
    pub environment: Environment,
    /// Overrides the environment's default API root.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Notification URL sent with payment requests that do not carry one.
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Currency assumed when a provider response omits one.
    #[serde(default)]
    pub default_currency: Option<Currency>,
    /// Accept notifications when no webhook secret is configured.
    #[serde(default)]
    pub accept_unsigned_webhooks: bool,
    /// Secrets handed to the adapter.
    #[serde(default)]
    pub credentials: AuthCredential,
    /// Provider-specific settings such as `country` or `locale`.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            base_url: None,
            callback_url: None,
            timeout_secs: default_timeout_secs(),
            default_currency: None,
            accept_unsigned_webhooks: false,
            credentials: AuthCredential::default(),
            options: BTreeMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Default settings with the given credentials.
    #[must_use]
    pub fn new(credentials: AuthCredential) -> Self {
        Self {
            credentials,
            ..Self::default()
        }
    }

    /// Sets `base_url`.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets `callback_url`.
    #[must_use]
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Sets `environment`.
    #[must_use]
    pub const fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets `timeout_secs`.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets `default_currency`.
    #[must_use]
    pub const fn with_default_currency(mut self, currency: Currency) -> Self {
        self.default_currency = Some(currency);
        self
    }

    /// Adds a provider-specific option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Accepts notifications even without a webhook secret.
    #[must_use]
    pub const fn accepting_unsigned_webhooks(mut self) -> Self {
        self.accept_unsigned_webhooks = true;
        self
    }

    /// `timeout_secs` as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured base URL, or the default for the configured environment.
    #[must_use]
    pub fn base_url_or<'a>(&'a self, sandbox: &'a str, production: &'a str) -> &'a str {
        match (&self.base_url, self.environment) {
            (Some(url), _) => url,
            (None, Environment::Sandbox) => sandbox,
            (None, Environment::Production) => production,
        }
    }

    /// A provider-specific option, ignoring blank values.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// The webhook policy implied by `accept_unsigned_webhooks`.
    #[must_use]
    pub const fn unsigned_policy(&self) -> UnsignedPolicy {
        if self.accept_unsigned_webhooks {
            UnsignedPolicy::AcceptUnsigned
        } else {
            UnsignedPolicy::Reject
        }
    }
}

/// Top-level configuration: every enabled provider plus the default one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Provider used when a call names none. Defaults to the first
    /// configured provider in key order.
    #[serde(default)]
    pub default_provider: Option<ProviderId>,
    /// Settings per provider key.
    #[serde(default)]
    pub providers: BTreeMap<ProviderId, ProviderConfig>,
}

impl SwitchConfig {
    /// Loads configuration from the path in `PAYSWITCH_CONFIG`, falling back
    /// to `payswitch.toml` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the file cannot be read,
    /// parsed or validated.
    pub fn load() -> Result<Self, SwitchError> {
        let path = std::env::var("PAYSWITCH_CONFIG").unwrap_or_else(|_| "payswitch.toml".to_owned());
        Self::load_from(path)
    }

    /// Loads configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if the file cannot be read,
    /// parsed or validated.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SwitchError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SwitchError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::parse(&expand_env_vars(&content, |name| std::env::var(name).ok()))?;
        if let Ok(provider) = std::env::var("PAYSWITCH_DEFAULT_PROVIDER") {
            if let Ok(provider) = provider.parse() {
                config.default_provider = Some(provider);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates TOML, expanding variables from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] on parse or validation failure.
    pub fn load_from_str(content: &str) -> Result<Self, SwitchError> {
        let config = Self::parse(&expand_env_vars(content, |name| std::env::var(name).ok()))?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, SwitchError> {
        toml::from_str(content).map_err(|e| SwitchError::Configuration(format!("invalid config: {e}")))
    }

    /// Checks that at least one provider is configured and that the default
    /// provider, if named, is one of them.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] describing the first problem.
    pub fn validate(&self) -> Result<(), SwitchError> {
        if self.providers.is_empty() {
            return Err(SwitchError::Configuration("no providers configured".into()));
        }
        if let Some(default) = &self.default_provider {
            if !self.providers.contains_key(default) {
                return Err(SwitchError::Configuration(format!(
                    "default provider '{default}' is not configured"
                )));
            }
        }
        for (id, provider) in &self.providers {
            if provider.timeout_secs == 0 {
                return Err(SwitchError::Configuration(format!(
                    "provider '{id}' has a zero timeout"
                )));
            }
        }
        Ok(())
    }

    /// The default provider: the configured one, or the first by key.
    #[must_use]
    pub fn resolved_default(&self) -> Option<&ProviderId> {
        self.default_provider
            .as_ref()
            .or_else(|| self.providers.keys().next())
    }

    /// Adds or replaces a provider entry.
    #[must_use]
    pub fn with_provider(mut self, id: impl Into<ProviderId>, config: ProviderConfig) -> Self {
        self.providers.insert(id.into(), config);
        self
    }

    /// Sets `default_provider`.
    #[must_use]
    pub fn with_default_provider(mut self, id: impl Into<ProviderId>) -> Self {
        self.default_provider = Some(id.into());
        self
    }
}

/// Replaces `$VAR` and `${VAR}` with values from `lookup`.
///
/// Unresolved references, and a `$` not followed by a name, are kept
/// verbatim.
fn expand_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, reference_len) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        let reference = &rest[pos..=pos + reference_len];
        match lookup(name) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(reference),
        }
        rest = &rest[pos + 1 + reference_len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(name: &str) -> Option<String> {
        match name {
            "KEY" => Some("sk_123".into()),
            "HOST" => Some("api.example.com".into()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_env_vars() {
        assert_eq!(expand_env_vars("key=$KEY", vars), "key=sk_123");
        assert_eq!(expand_env_vars("https://${HOST}/v1", vars), "https://api.example.com/v1");
        assert_eq!(expand_env_vars("$MISSING and ${MISSING}", vars), "$MISSING and ${MISSING}");
        assert_eq!(expand_env_vars("cost: 5$ or ${", vars), "cost: 5$ or ${");
        assert_eq!(expand_env_vars("no refs", vars), "no refs");
    }

    #[test]
    fn test_parse_full_config() {
        let config = SwitchConfig::load_from_str(
            r#"
            default_provider = "Paystack"

            [providers.paystack]
            environment = "production"
            timeout_secs = 10
            default_currency = "NGN"

            [providers.paystack.credentials]
            api_key = "sk_live"

            [providers.klarna]
            base_url = "http://127.0.0.1:9000"
            accept_unsigned_webhooks = true

            [providers.klarna.credentials]
            api_username = "merchant"
            api_key = "secret"

            [providers.klarna.options]
            locale = "sv-SE"
            "#,
        )
        .unwrap();

        assert_eq!(config.resolved_default(), Some(&ProviderId::new("paystack")));
        let paystack = &config.providers[&ProviderId::new("paystack")];
        assert_eq!(paystack.environment, Environment::Production);
        assert_eq!(paystack.timeout(), Duration::from_secs(10));
        assert_eq!(paystack.default_currency, Some(Currency::NGN));
        assert_eq!(paystack.unsigned_policy(), UnsignedPolicy::Reject);

        let klarna = &config.providers[&ProviderId::new("klarna")];
        assert_eq!(klarna.timeout_secs, 30);
        assert_eq!(klarna.credentials.username.as_deref(), Some("merchant"));
        assert_eq!(klarna.option("locale"), Some("sv-SE"));
        assert_eq!(klarna.unsigned_policy(), UnsignedPolicy::AcceptUnsigned);
        assert_eq!(
            klarna.base_url_or("https://sandbox", "https://prod"),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn test_default_provider_falls_back_to_first_key() {
        let config = SwitchConfig::default()
            .with_provider("orange", ProviderConfig::default())
            .with_provider("airtel", ProviderConfig::default());
        assert_eq!(config.resolved_default(), Some(&ProviderId::new("airtel")));
    }

    #[test]
    fn test_validation_failures() {
        assert!(SwitchConfig::load_from_str("").is_err());
        let err = SwitchConfig::load_from_str(
            r#"
            default_provider = "mtn"
            [providers.orange]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SwitchError::Configuration(ref m) if m.contains("mtn")));
        assert!(SwitchConfig::load_from_str("[providers.mtn]\ntimeout_secs = 0").is_err());
        assert!(SwitchConfig::load_from_str("[providers.mtn]\nenvironment = \"staging\"").is_err());
    }

    #[test]
    fn test_base_url_follows_environment() {
        let sandbox = ProviderConfig::default();
        let production = ProviderConfig::default().with_environment(Environment::Production);
        assert_eq!(sandbox.base_url_or("s", "p"), "s");
        assert_eq!(production.base_url_or("s", "p"), "p");
    }
}
