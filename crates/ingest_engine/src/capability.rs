//! Narrow interfaces to the collaborators the pipeline drives but does not own.
use std::fmt;

use async_trait::async_trait;
use ingest_core::{CandidateReference, FieldMap};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{CapabilityError, QuerySchema};

/// The "request more results" control of a listing.
#[async_trait]
pub trait DiscoveryTrigger: Send + Sync {
    /// Load one more batch. `Ok(false)` means no new items appeared.
    async fn expand(&self) -> Result<bool, CapabilityError>;

    /// Every item href currently visible, in listing order.
    async fn collect_references(&self) -> Result<Vec<String>, CapabilityError>;
}

/// A loaded detail page, handed untouched from the loader to the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemContext {
    reference: CandidateReference,
    document: String,
}

impl ItemContext {
    pub fn new(reference: CandidateReference, document: impl Into<String>) -> Self {
        Self {
            reference,
            document: document.into(),
        }
    }

    pub fn reference(&self) -> &CandidateReference {
        &self.reference
    }

    pub fn document(&self) -> &str {
        &self.document
    }
}

#[async_trait]
pub trait ItemLoader: Send + Sync {
    async fn load(&self, reference: &CandidateReference) -> Result<ItemContext, CapabilityError>;
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// `Ok(None)` (or an empty map) means the page held no record.
    async fn extract(
        &self,
        context: &ItemContext,
        schema: &QuerySchema,
    ) -> Result<Option<FieldMap>, CapabilityError>;
}

/// Table-addressed persistent store. Items and run metrics live in two
/// tables behind the same client.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn lookup(&self, table: &str, identity: &str) -> Result<bool, CapabilityError>;

    async fn insert(&self, table: &str, fields: Map<String, Value>) -> Result<(), CapabilityError>;
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<(), CapabilityError>;
}
