//! Vendor directory: commission rates and account status.
//!
//! Owned by the vendor-management side of the marketplace; the engine only
//! reads it. The in-memory implementation carries the admin setters the API
//! exposes.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bazaar_core::{DomainError, Rate, VendorId};
use bazaar_settlement::VendorStatus;

use crate::command_dispatcher::DispatchError;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("unknown vendor '{0}'")]
    UnknownVendor(VendorId),

    #[error("vendor directory unavailable: {0}")]
    Unavailable(String),
}

impl From<DirectoryError> for DispatchError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::UnknownVendor(vendor_id) => {
                DispatchError::Domain(DomainError::not_found("vendor", vendor_id))
            }
            DirectoryError::Unavailable(msg) => DispatchError::Directory(msg),
        }
    }
}

pub trait VendorDirectory: Send + Sync {
    /// Current commission rate. Read at delivery time and frozen into the
    /// sub-order; later changes never touch settled transactions.
    fn commission_rate(&self, vendor_id: VendorId) -> Result<Rate, DirectoryError>;

    fn status(&self, vendor_id: VendorId) -> Result<VendorStatus, DirectoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAccount {
    pub vendor_id: VendorId,
    pub commission_rate: Rate,
    pub status: VendorStatus,
}

#[derive(Debug, Default)]
pub struct InMemoryVendorDirectory {
    accounts: RwLock<HashMap<VendorId, VendorAccount>>,
}

impl InMemoryVendorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, account: VendorAccount) -> Result<(), DirectoryError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        accounts.insert(account.vendor_id, account);
        Ok(())
    }

    pub fn set_commission_rate(&self, vendor_id: VendorId, rate: Rate) -> Result<(), DirectoryError> {
        self.update(vendor_id, |a| a.commission_rate = rate)
    }

    pub fn set_status(&self, vendor_id: VendorId, status: VendorStatus) -> Result<(), DirectoryError> {
        self.update(vendor_id, |a| a.status = status)
    }

    pub fn get(&self, vendor_id: VendorId) -> Result<VendorAccount, DirectoryError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        accounts
            .get(&vendor_id)
            .cloned()
            .ok_or(DirectoryError::UnknownVendor(vendor_id))
    }

    fn update(&self, vendor_id: VendorId, f: impl FnOnce(&mut VendorAccount)) -> Result<(), DirectoryError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        let account = accounts
            .get_mut(&vendor_id)
            .ok_or(DirectoryError::UnknownVendor(vendor_id))?;
        f(account);
        Ok(())
    }
}

impl VendorDirectory for InMemoryVendorDirectory {
    fn commission_rate(&self, vendor_id: VendorId) -> Result<Rate, DirectoryError> {
        self.get(vendor_id).map(|a| a.commission_rate)
    }

    fn status(&self, vendor_id: VendorId) -> Result<VendorStatus, DirectoryError> {
        self.get(vendor_id).map(|a| a.status)
    }
}
