//! Block explorer and content gateway URLs shown next to results

use crate::config::LinksConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerLinks {
    explorer_base: String,
    gateway_base: String,
}

impl ExplorerLinks {
    pub fn new(explorer_base: &str, gateway_base: &str) -> Self {
        Self {
            explorer_base: explorer_base.trim_end_matches('/').to_string(),
            gateway_base: gateway_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &LinksConfig) -> Self {
        Self::new(&config.explorer_base_url, &config.gateway_base_url)
    }

    pub fn tx_url(&self, tx_id: &str) -> String {
        format!("{}/tx/{}", self.explorer_base, tx_id)
    }

    pub fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer_base, address)
    }

    pub fn content_url(&self, content_id: &str) -> String {
        format!("{}/ipfs/{}", self.gateway_base, content_id)
    }
}

impl Default for ExplorerLinks {
    fn default() -> Self {
        Self::from_config(&LinksConfig::default())
    }
}
