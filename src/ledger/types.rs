//! Ledger Core Types
//!
//! Addresses, pending identifiers and call descriptors shared by the
//! submission, confirmation and query services.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// 20-byte account or contract address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check `0x` + exactly 40 hex characters (either case)
    pub fn is_well_formed(s: &str) -> bool {
        match s.strip_prefix("0x") {
            Some(body) => body.len() == 40 && body.bytes().all(|b| b.is_ascii_hexdigit()),
            None => false,
        }
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_well_formed(s) {
            return Err(LedgerError::InvalidAddress(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(&s[2..], &mut bytes)
            .map_err(|_| LedgerError::InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque handle returned by the submission service (a transaction hash).
///
/// Never empty: an absent identifier is `Option::None` at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(String);

impl PendingId {
    /// Returns `None` for an empty token
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One positional argument of a contract call.
///
/// Addresses are carried as the raw user input so that validation can
/// happen at submission time without losing what the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    Address(String),
    Str(String),
    Uint(u128),
    Bool(bool),
}

impl CallArg {
    /// Canonical ABI type name used in function signatures
    pub fn abi_type(&self) -> &'static str {
        match self {
            CallArg::Address(_) => "address",
            CallArg::Str(_) => "string",
            CallArg::Uint(_) => "uint256",
            CallArg::Bool(_) => "bool",
        }
    }
}

/// Everything needed to submit (or query) one contract operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    target: String,
    function: String,
    args: Vec<CallArg>,
    gas_limit: Option<u64>,
}

impl CallDescriptor {
    pub fn new(target: impl Into<String>, function: impl Into<String>, args: Vec<CallArg>) -> Self {
        Self {
            target: target.into(),
            function: function.into(),
            args,
            gas_limit: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn args(&self) -> &[CallArg] {
        &self.args
    }

    pub fn gas_limit(&self) -> Option<u64> {
        self.gas_limit
    }

    /// `name(type1,type2,...)`
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.args.iter().map(CallArg::abi_type).collect();
        format!("{}({})", self.function, types.join(","))
    }

    /// Local well-formedness check. Performs no I/O.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !Address::is_well_formed(&self.target) {
            return Err(LedgerError::InvalidAddress(self.target.clone()));
        }

        let mut chars = self.function.chars();
        let valid_name = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid_name {
            return Err(LedgerError::InvalidCall(format!(
                "invalid operation name '{}'",
                self.function
            )));
        }

        for arg in &self.args {
            if let CallArg::Address(raw) = arg
                && !Address::is_well_formed(raw)
            {
                return Err(LedgerError::InvalidAddress(raw.clone()));
            }
        }

        if self.gas_limit == Some(0) {
            return Err(LedgerError::InvalidCall("gas limit must be positive".into()));
        }

        Ok(())
    }
}
