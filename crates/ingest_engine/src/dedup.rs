use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use ingest_core::CandidateReference;
use serde::Deserialize;

use crate::{CapabilityError, StoreClient};

/// What to do with an item whose dedup lookup failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum DedupFailurePolicy {
    /// Count the item as failed and move on. Never risks a duplicate row.
    #[default]
    FailClosed,
    /// Treat the item as unseen and process it.
    FailOpen,
}

/// Point lookups against the items table, plus memory of what this run saved.
pub struct DedupAdapter {
    store: Arc<dyn StoreClient>,
    table: String,
    policy: DedupFailurePolicy,
    saved_this_run: Mutex<HashSet<String>>,
}

impl DedupAdapter {
    pub fn new(store: Arc<dyn StoreClient>, table: impl Into<String>, policy: DedupFailurePolicy) -> Self {
        Self {
            store,
            table: table.into(),
            policy,
            saved_this_run: Mutex::new(HashSet::new()),
        }
    }

    pub fn policy(&self) -> DedupFailurePolicy {
        self.policy
    }

    pub async fn exists(&self, identity: &CandidateReference) -> Result<bool, CapabilityError> {
        if self.remembers(identity) {
            return Ok(true);
        }
        self.store.lookup(&self.table, identity.as_str()).await
    }

    /// Record a successful save so repeats in the same listing short-circuit
    /// even if the store lags behind its own writes.
    pub fn remember(&self, identity: &CandidateReference) {
        self.saved_this_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.as_str().to_string());
    }

    fn remembers(&self, identity: &CandidateReference) -> bool {
        self.saved_this_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity.as_str())
    }
}
