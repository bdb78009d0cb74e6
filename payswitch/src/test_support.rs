//! In-memory adapter used by unit tests of the registry and facade.

use async_trait::async_trait;
use chrono::Utc;
use http::HeaderMap;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use crate::adapter::Adapter;
use crate::amount::{CurrencyBounds, CurrencyRules};
use crate::config::ProviderConfig;
use crate::error::SwitchError;
use crate::model::{
    Currency, Metadata, PaymentResponse, ProviderId, TransactionDetail,
    TransactionStatusResponse, WebhookEvent,
};
use crate::status::{StatusMap, TransactionStatus};

const STATUSES: StatusMap = StatusMap::new(&[("done", TransactionStatus::Successful)]);

#[derive(Debug)]
pub struct StubAdapter {
    provider: ProviderId,
    has_key: bool,
    rules: CurrencyRules,
}

impl StubAdapter {
    pub fn boxed(config: &ProviderConfig) -> Result<Box<dyn Adapter>, SwitchError> {
        Ok(Box::new(Self {
            provider: ProviderId::new(config.option("name").unwrap_or("stub")),
            has_key: config.credentials.has_all(&["api_key"]),
            rules: CurrencyRules::new([CurrencyBounds::whole(Currency::EUR, 1, 1_000)]),
        }))
    }
}

#[async_trait]
impl Adapter for StubAdapter {
    fn provider(&self) -> ProviderId {
        self.provider.clone()
    }

    fn validate_credentials(&self) -> bool {
        self.has_key
    }

    fn currency_rules(&self) -> &CurrencyRules {
        &self.rules
    }

    fn normalize_status(&self, raw: &str) -> TransactionStatus {
        STATUSES.normalize(raw)
    }

    async fn auth_headers(&self) -> Result<HeaderMap, SwitchError> {
        Ok(HeaderMap::new())
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> Result<Value, SwitchError> {
        self.rules.validate(transaction.amount, transaction.currency)?;
        Ok(json!({"reference": transaction.reference}))
    }

    async fn send_payment(
        &self,
        transaction: &TransactionDetail,
    ) -> Result<PaymentResponse, SwitchError> {
        let payload = self.format_transaction(transaction)?;
        Ok(PaymentResponse {
            transaction_id: format!("{}-{}", self.provider, transaction.transaction_id),
            reference: transaction.reference.clone(),
            provider: self.provider.clone(),
            status: TransactionStatus::Pending,
            amount: transaction.amount,
            currency: transaction.currency,
            payment_link: None,
            transaction_token: None,
            customer: None,
            created_at: None,
            expires_at: None,
            metadata: Metadata::new(),
            raw_response: payload,
        })
    }

    async fn check_status(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatusResponse, SwitchError> {
        Ok(TransactionStatusResponse {
            transaction_id: transaction_id.to_owned(),
            provider: self.provider.clone(),
            status: self.normalize_status("done"),
            amount: Decimal::ONE,
            data: Value::Null,
        })
    }

    async fn refund(
        &self,
        _transaction_id: &str,
        _amount: Option<Decimal>,
    ) -> Result<PaymentResponse, SwitchError> {
        Err(SwitchError::unsupported(self.provider.clone(), "refund"))
    }

    async fn transaction_detail(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionDetail, SwitchError> {
        Ok(TransactionDetail::new(transaction_id, transaction_id, Decimal::ONE, Currency::EUR))
    }

    fn parse_webhook(
        &self,
        _raw_body: &[u8],
        _headers: &HeaderMap,
    ) -> Result<WebhookEvent, SwitchError> {
        Ok(WebhookEvent {
            event_type: "stub".into(),
            provider: self.provider.clone(),
            transaction_id: "t".into(),
            status: TransactionStatus::Unknown,
            amount: Decimal::ONE,
            currency: Currency::EUR,
            received_at: Utc::now(),
            raw_data: Value::Null,
            metadata: Metadata::new(),
            context: Metadata::new(),
        })
    }
}
