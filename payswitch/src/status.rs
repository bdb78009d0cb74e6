//! Canonical transaction status and per-provider normalization tables.
//!
//! Each adapter declares a `const` [`StatusMap`] translating its own status
//! vocabulary into [`TransactionStatus`]. Lookup is case-insensitive and
//! total: tokens missing from the table normalize to
//! [`TransactionStatus::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Initiated but not yet settled.
    Pending,
    /// Settled in the merchant's favour.
    Successful,
    /// Rejected or errored.
    Failed,
    /// Voided before settlement.
    Cancelled,
    /// Fully or partially returned to the customer.
    Refunded,
    /// The provider reported a status this adapter does not recognize.
    #[default]
    Unknown,
}

impl TransactionStatus {
    /// Every canonical status.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Successful,
        Self::Failed,
        Self::Cancelled,
        Self::Refunded,
        Self::Unknown,
    ];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `true` once no further transition is expected.
    #[must_use]
    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Pending | Self::Unknown)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static table from provider status tokens to canonical statuses.
#[derive(Debug, Clone, Copy)]
pub struct StatusMap {
    entries: &'static [(&'static str, TransactionStatus)],
}

impl StatusMap {
    /// Creates a table from `(provider token, canonical status)` pairs.
    #[must_use]
    pub const fn new(entries: &'static [(&'static str, TransactionStatus)]) -> Self {
        Self { entries }
    }

    /// Maps a raw provider token to a canonical status.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> TransactionStatus {
        let raw = raw.trim();
        self.entries
            .iter()
            .find(|(token, _)| token.eq_ignore_ascii_case(raw))
            .map_or(TransactionStatus::Unknown, |(_, status)| *status)
    }

    /// Like [`normalize`](Self::normalize), treating an absent token as unknown.
    #[must_use]
    pub fn normalize_opt(&self, raw: Option<&str>) -> TransactionStatus {
        raw.map_or(TransactionStatus::Unknown, |r| self.normalize(r))
    }

    /// The provider tokens this table recognizes.
    pub fn tokens(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|(token, _)| *token)
    }
}
