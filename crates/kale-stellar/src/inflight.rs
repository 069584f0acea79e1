//! One in-flight submission per source account.
//!
//! Two concurrent builds from the same account would read the same sequence
//! number and one of them would be rejected after the user already signed.
//! The second attempt fails fast with `AccountBusy` instead.

use crate::error::KaleError;
use crate::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    accounts: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.accounts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `address` busy until the returned guard drops
    pub fn try_acquire(&self, address: &str) -> Result<InFlightGuard> {
        if !self.lock().insert(address.to_string()) {
            return Err(KaleError::AccountBusy(address.to_string()));
        }
        debug!("In-flight marker set for {}", address);
        Ok(InFlightGuard {
            registry: self.clone(),
            address: address.to_string(),
        })
    }

    pub fn is_busy(&self, address: &str) -> bool {
        self.lock().contains(address)
    }
}

/// Releases the account's marker on drop
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    address: String,
}

impl InFlightGuard {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.address);
        debug!("In-flight marker released for {}", self.address);
    }
}
