use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Fiat currencies a settlement can pay out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiatCurrency {
    INR,
    BRL,
    EUR,
}

impl FiatCurrency {
    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::INR => "INR",
            Self::BRL => "BRL",
            Self::EUR => "EUR",
        }
    }

    /// Number of decimal places used when rounding payouts.
    pub fn decimals(&self) -> u32 {
        2
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "INR" => Some(Self::INR),
            "BRL" => Some(Self::BRL),
            "EUR" => Some(Self::EUR),
            _ => None,
        }
    }
}

impl fmt::Display for FiatCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Where the merchant receives fiat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MerchantPaymentMethod {
    /// India's Unified Payments Interface.
    Upi { upi_id: String },
    /// Brazil's instant payment system.
    Pix { pix_key: String },
    /// Single Euro Payments Area bank transfer.
    Sepa { iban: String, account_holder: String },
}

impl MerchantPaymentMethod {
    /// Payout currency implied by the rail.
    pub fn fiat_currency(&self) -> FiatCurrency {
        match self {
            Self::Upi { .. } => FiatCurrency::INR,
            Self::Pix { .. } => FiatCurrency::BRL,
            Self::Sepa { .. } => FiatCurrency::EUR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upi { .. } => "upi",
            Self::Pix { .. } => "pix",
            Self::Sepa { .. } => "sepa",
        }
    }

    /// Check that the variant carries all of its required fields.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::Upi { upi_id } => {
                require("upi_id", upi_id)?;
                if !upi_id.contains('@') {
                    return Err(CoreError::InvalidPaymentMethod(format!(
                        "upi_id must be of the form name@handle, got: {}",
                        upi_id
                    )));
                }
            }
            Self::Pix { pix_key } => require("pix_key", pix_key)?,
            Self::Sepa {
                iban,
                account_holder,
            } => {
                require("iban", iban)?;
                require("account_holder", account_holder)?;
                validate_iban_shape(iban)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for MerchantPaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upi { upi_id } => write!(f, "upi:{}", upi_id),
            Self::Pix { pix_key } => write!(f, "pix:{}", pix_key),
            Self::Sepa { iban, .. } => write!(f, "sepa:{}", iban),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidPaymentMethod(format!(
            "missing required field: {}",
            field
        )));
    }
    Ok(())
}

/// Country code, check digits, then 11..=30 alphanumerics.
fn validate_iban_shape(iban: &str) -> Result<(), CoreError> {
    let compact: String = iban.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = compact.as_bytes();
    let ok = (15..=34).contains(&bytes.len())
        && bytes[..2].iter().all(u8::is_ascii_alphabetic)
        && bytes[2..4].iter().all(u8::is_ascii_digit)
        && bytes[4..].iter().all(u8::is_ascii_alphanumeric);
    if !ok {
        return Err(CoreError::InvalidPaymentMethod(format!(
            "malformed iban: {}",
            iban
        )));
    }
    Ok(())
}
