//! The instrument a request is made for.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Unsupported secType: {0}")]
    UnsupportedSecType(String),

    #[error("Contract field {field} must not be empty")]
    EmptyField { field: &'static str },
}

/// Security type. Only stocks are supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecType {
    #[serde(rename = "STK")]
    Stock,
}

impl fmt::Display for SecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecType::Stock => f.write_str("STK"),
        }
    }
}

impl FromStr for SecType {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STK" => Ok(SecType::Stock),
            _ => Err(ContractError::UnsupportedSecType(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub exchange: String,
    pub currency: String,
    pub sec_type: SecType,
}

impl Contract {
    /// Builds a contract from its configured parts, validating the security type.
    pub fn new(
        symbol: &str,
        exchange: &str,
        currency: &str,
        sec_type: &str,
    ) -> Result<Self, ContractError> {
        let non_empty = |field: &'static str, v: &str| {
            let v = v.trim();
            if v.is_empty() {
                Err(ContractError::EmptyField { field })
            } else {
                Ok(v.to_string())
            }
        };
        Ok(Self {
            symbol: non_empty("symbol", symbol)?,
            exchange: non_empty("exchange", exchange)?,
            currency: non_empty("currency", currency)?,
            sec_type: sec_type.parse()?,
        })
    }
}
