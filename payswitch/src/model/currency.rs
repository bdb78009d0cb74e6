use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// ISO 4217 currencies handled by at least one shipped adapter.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Currency {
    /// West African CFA franc
    XOF,
    /// Central African CFA franc
    XAF,
    /// Nigerian naira
    NGN,
    /// Ghanaian cedi
    GHS,
    /// Euro
    EUR,
    /// US dollar
    USD,
    /// Congolese franc
    CDF,
    /// Guinean franc
    GNF,
    /// Comorian franc
    KMF,
    /// Pound sterling
    GBP,
    /// Swedish krona
    SEK,
    /// Norwegian krone
    NOK,
    /// Danish krone
    DKK,
    /// Ugandan shilling
    UGX,
    /// Tanzanian shilling
    TZS,
    /// Kenyan shilling
    KES,
    /// Rwandan franc
    RWF,
    /// Zambian kwacha
    ZMW,
    /// Malawian kwacha
    MWK,
    /// Burundian franc
    BIF,
    /// Ethiopian birr
    ETB,
    /// Botswana pula
    BWP,
    /// Zimbabwean dollar
    ZWL,
}

impl Currency {
    /// Every supported currency, in declaration order.
    pub const ALL: [Self; 23] = [
        Self::XOF,
        Self::XAF,
        Self::NGN,
        Self::GHS,
        Self::EUR,
        Self::USD,
        Self::CDF,
        Self::GNF,
        Self::KMF,
        Self::GBP,
        Self::SEK,
        Self::NOK,
        Self::DKK,
        Self::UGX,
        Self::TZS,
        Self::KES,
        Self::RWF,
        Self::ZMW,
        Self::MWK,
        Self::BIF,
        Self::ETB,
        Self::BWP,
        Self::ZWL,
    ];

    /// Returns the three-letter ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::XOF => "XOF",
            Self::XAF => "XAF",
            Self::NGN => "NGN",
            Self::GHS => "GHS",
            Self::EUR => "EUR",
            Self::USD => "USD",
            Self::CDF => "CDF",
            Self::GNF => "GNF",
            Self::KMF => "KMF",
            Self::GBP => "GBP",
            Self::SEK => "SEK",
            Self::NOK => "NOK",
            Self::DKK => "DKK",
            Self::UGX => "UGX",
            Self::TZS => "TZS",
            Self::KES => "KES",
            Self::RWF => "RWF",
            Self::ZMW => "ZMW",
            Self::MWK => "MWK",
            Self::BIF => "BIF",
            Self::ETB => "ETB",
            Self::BWP => "BWP",
            Self::ZWL => "ZWL",
        }
    }

    /// Number of decimal digits in the currency's minor unit.
    #[must_use]
    pub const fn minor_unit_exponent(self) -> u32 {
        match self {
            Self::XOF
            | Self::XAF
            | Self::GNF
            | Self::KMF
            | Self::UGX
            | Self::RWF
            | Self::BIF => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when a currency code is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown currency code '{0}'")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownCurrency(code.to_owned()))
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
