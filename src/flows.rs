//! Admin and manufacturer flows
//!
//! - grant: `addManufacturer(address)` through the lifecycle controller
//! - register: pin the metadata file, then `registerProduct` with its CID

use std::sync::Arc;

use tracing::{info, warn};

use crate::contract::TraceContract;
use crate::ledger::{ConfirmationWatcher, SubmissionService};
use crate::lifecycle::{ControllerOptions, LifecycleError, LifecycleSnapshot, TxController};
use crate::links::ExplorerLinks;
use crate::pinning::{ContentId, ContentPinner, PinError};

/// Product registration input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub product_id: String,
    pub name: String,
    pub quality: String,
    content_id: Option<ContentId>,
}

impl RegistrationForm {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        quality: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            quality: quality.into(),
            content_id: None,
        }
    }

    pub fn content_id(&self) -> Option<&ContentId> {
        self.content_id.as_ref()
    }

    /// Use a CID pinned elsewhere
    pub fn set_content_id(&mut self, content_id: ContentId) {
        self.content_id = Some(content_id);
    }

    /// Pin `bytes` and remember the returned CID.
    ///
    /// A failed upload keeps the previous CID.
    pub async fn upload(
        &mut self,
        pinner: &dyn ContentPinner,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ContentId, PinError> {
        match pinner.pin(file_name, bytes).await {
            Ok(cid) => {
                self.content_id = Some(cid.clone());
                Ok(cid)
            }
            Err(e) => {
                warn!(file_name, error = %e, "Metadata upload failed");
                Err(e)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.missing_field().is_none() && self.content_id.is_some()
    }

    fn missing_field(&self) -> Option<&'static str> {
        [
            ("product id", &self.product_id),
            ("product name", &self.name),
            ("quality info", &self.quality),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// Contract writes for one signer, sharing a single lifecycle controller
pub struct TraceClient {
    contract: TraceContract,
    controller: TxController,
    links: ExplorerLinks,
}

impl TraceClient {
    pub fn new(
        contract: TraceContract,
        submitter: Arc<dyn SubmissionService>,
        watcher: Arc<dyn ConfirmationWatcher>,
        options: ControllerOptions,
        links: ExplorerLinks,
    ) -> Self {
        Self {
            contract,
            controller: TxController::with_options(submitter, watcher, options),
            links,
        }
    }

    pub fn contract(&self) -> &TraceContract {
        &self.contract
    }

    pub fn controller(&self) -> &TxController {
        &self.controller
    }

    pub fn links(&self) -> &ExplorerLinks {
        &self.links
    }

    pub fn grant_manufacturer(&self, address: &str) -> Result<u64, LifecycleError> {
        info!(address = address.trim(), "Granting manufacturer role");
        self.controller
            .submit(self.contract.add_manufacturer(address))
    }

    pub fn register_product(&self, form: &RegistrationForm) -> Result<u64, LifecycleError> {
        if let Some(field) = form.missing_field() {
            return Err(LifecycleError::Validation(format!("{} is required", field)));
        }
        let Some(cid) = form.content_id() else {
            return Err(LifecycleError::Validation("upload file first".into()));
        };
        info!(product_id = %form.product_id, cid = %cid, "Registering product");
        self.controller.submit(self.contract.register_product(
            &form.product_id,
            &form.name,
            cid.as_str(),
            &form.quality,
        ))
    }

    /// Explorer link for the current pending identifier
    pub fn tx_link(&self, snapshot: &LifecycleSnapshot) -> Option<String> {
        snapshot
            .pending_id
            .as_ref()
            .map(|id| self.links.tx_url(id.as_str()))
    }

    pub fn contract_link(&self) -> String {
        self.links.address_url(self.contract.address())
    }
}
