//! Product-traceability contract entry points
//!
//! ```text
//! addManufacturer(address)                                  admin only
//! registerProduct(string id, string name, string cid, string quality)
//! verifyProduct(string id) → (bool, string, string, string, address, uint256)
//! ```

use crate::ledger::{CallArg, CallDescriptor};

pub const ADD_MANUFACTURER: &str = "addManufacturer";
pub const REGISTER_PRODUCT: &str = "registerProduct";
pub const VERIFY_PRODUCT: &str = "verifyProduct";

pub const DEFAULT_GRANT_GAS: u64 = 200_000;
pub const DEFAULT_REGISTER_GAS: u64 = 500_000;

/// Bound to one deployed contract
#[derive(Debug, Clone)]
pub struct TraceContract {
    address: String,
    grant_gas: Option<u64>,
    register_gas: Option<u64>,
}

impl TraceContract {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            grant_gas: Some(DEFAULT_GRANT_GAS),
            register_gas: Some(DEFAULT_REGISTER_GAS),
        }
    }

    /// Override gas hints; `None` leaves estimation to the signer
    pub fn with_gas(mut self, grant: Option<u64>, register: Option<u64>) -> Self {
        self.grant_gas = grant;
        self.register_gas = register;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn with_hint(call: CallDescriptor, gas: Option<u64>) -> CallDescriptor {
        match gas {
            Some(gas) => call.with_gas_limit(gas),
            None => call,
        }
    }

    pub fn add_manufacturer(&self, manufacturer: &str) -> CallDescriptor {
        let call = CallDescriptor::new(
            self.address.clone(),
            ADD_MANUFACTURER,
            vec![CallArg::Address(manufacturer.trim().to_string())],
        );
        Self::with_hint(call, self.grant_gas)
    }

    pub fn register_product(
        &self,
        product_id: &str,
        name: &str,
        content_id: &str,
        quality: &str,
    ) -> CallDescriptor {
        let call = CallDescriptor::new(
            self.address.clone(),
            REGISTER_PRODUCT,
            vec![
                CallArg::Str(product_id.to_string()),
                CallArg::Str(name.to_string()),
                CallArg::Str(content_id.to_string()),
                CallArg::Str(quality.to_string()),
            ],
        );
        Self::with_hint(call, self.register_gas)
    }

    pub fn verify_product(&self, code: &str) -> CallDescriptor {
        CallDescriptor::new(
            self.address.clone(),
            VERIFY_PRODUCT,
            vec![CallArg::Str(code.to_string())],
        )
    }
}
