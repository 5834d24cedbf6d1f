use std::sync::Arc;

use ingest_core::ItemRecord;

use crate::{CapabilityError, StoreClient};

/// Appends item records to the items table.
///
/// Exactly one insert per call: retries would blur the saved/failed counts.
pub struct RecordSink {
    store: Arc<dyn StoreClient>,
    table: String,
    identity_field: String,
}

impl RecordSink {
    pub fn new(
        store: Arc<dyn StoreClient>,
        table: impl Into<String>,
        identity_field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            identity_field: identity_field.into(),
        }
    }

    pub async fn save(&self, record: &ItemRecord) -> Result<(), CapabilityError> {
        let fields = record.to_store_fields(&self.identity_field);
        self.store.insert(&self.table, fields).await
    }
}
