#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ingest_core::{CandidateReference, FieldMap, FieldValue};
use ingest_engine::{
    Authenticator, Capabilities, CapabilityError, Clock, Credentials, DiscoveryTrigger, Extractor,
    FailureKind, ItemContext, ItemLoader, ProgressSink, QuerySchema, RunEvent, StoreClient,
};
use serde_json::{Map, Value};

pub const ITEMS: &str = "items";
pub const METRICS: &str = "run_metrics";
pub const BASE: &str = "https://offers.example.com/en/offres/recherche";

pub fn init_logging() {
    pipeline_logging::initialize_for_tests();
}

pub fn reference(path: &str) -> CandidateReference {
    CandidateReference::new(format!("https://offers.example.com{path}"))
}

pub fn fixed_clock() -> Clock {
    let start: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    Arc::new(move || start)
}

/// Listing that reveals one scripted page per expansion.
pub struct FakeListing {
    pages: Vec<Vec<String>>,
    revealed: AtomicUsize,
    fail_expand_at: Option<usize>,
    fail_collect: bool,
    pub expand_calls: AtomicUsize,
}

impl FakeListing {
    /// `pages[0]` is visible before any expansion.
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| page.into_iter().map(str::to_string).collect())
                .collect(),
            revealed: AtomicUsize::new(1),
            fail_expand_at: None,
            fail_collect: false,
            expand_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_expand_at(mut self, call: usize) -> Self {
        self.fail_expand_at = Some(call);
        self
    }

    pub fn failing_collect(mut self) -> Self {
        self.fail_collect = true;
        self
    }
}

#[async_trait]
impl DiscoveryTrigger for FakeListing {
    async fn expand(&self) -> Result<bool, CapabilityError> {
        let call = self.expand_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_expand_at == Some(call) {
            return Err(CapabilityError::new(FailureKind::Timeout, "button vanished"));
        }
        let revealed = self.revealed.load(Ordering::SeqCst);
        if revealed >= self.pages.len() {
            return Ok(false);
        }
        self.revealed.store(revealed + 1, Ordering::SeqCst);
        Ok(true)
    }

    async fn collect_references(&self) -> Result<Vec<String>, CapabilityError> {
        if self.fail_collect {
            return Err(CapabilityError::new(FailureKind::Network, "page crashed"));
        }
        let revealed = self.revealed.load(Ordering::SeqCst);
        Ok(self.pages[..revealed.min(self.pages.len())].concat())
    }
}

/// In-memory two-table store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    failing_lookups: Mutex<HashSet<String>>,
    failing_inserts: Mutex<HashSet<String>>,
    fail_metrics: Mutex<bool>,
    pub lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_item(&self, identity: &str) {
        let mut row = Map::new();
        row.insert("url".into(), Value::String(identity.to_string()));
        self.tables
            .lock()
            .unwrap()
            .entry(ITEMS.to_string())
            .or_default()
            .push(row);
    }

    pub fn fail_lookup_for(&self, identity: &str) {
        self.failing_lookups.lock().unwrap().insert(identity.to_string());
    }

    pub fn fail_insert_for(&self, identity: &str) {
        self.failing_inserts.lock().unwrap().insert(identity.to_string());
    }

    pub fn fail_metrics_inserts(&self) {
        *self.fail_metrics.lock().unwrap() = true;
    }

    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn item_urls(&self) -> Vec<String> {
        self.rows(ITEMS)
            .iter()
            .filter_map(|row| row.get("url").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn lookup(&self, table: &str, identity: &str) -> Result<bool, CapabilityError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_lookups.lock().unwrap().contains(identity) {
            return Err(CapabilityError::new(FailureKind::HttpStatus(503), "store down"));
        }
        Ok(self
            .rows(table)
            .iter()
            .any(|row| row.get("url").and_then(Value::as_str) == Some(identity)))
    }

    async fn insert(&self, table: &str, fields: Map<String, Value>) -> Result<(), CapabilityError> {
        if table == METRICS && *self.fail_metrics.lock().unwrap() {
            return Err(CapabilityError::new(FailureKind::HttpStatus(500), "metrics table down"));
        }
        let identity = fields.get("url").and_then(Value::as_str).unwrap_or_default();
        if self.failing_inserts.lock().unwrap().contains(identity) {
            return Err(CapabilityError::new(FailureKind::HttpStatus(422), "invalid row"));
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(fields);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Record,
    SlowRecord(Duration),
    NoData,
    LoadFails(FailureKind),
    ExtractFails(FailureKind),
    /// Fails with the kind this many times, then yields a record.
    Flaky(FailureKind, usize),
}

/// Scripted item site: loader and extractor in one.
#[derive(Default)]
pub struct ScriptedSite {
    behaviors: Mutex<HashMap<String, Behavior>>,
    attempts: Mutex<HashMap<String, usize>>,
    pub loads: Mutex<Vec<String>>,
}

impl ScriptedSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, reference: &CandidateReference, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(reference.as_str().to_string(), behavior);
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    fn behavior(&self, reference: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or(Behavior::Record)
    }

    fn attempt(&self, reference: &str) -> usize {
        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(reference.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait]
impl ItemLoader for ScriptedSite {
    async fn load(&self, reference: &CandidateReference) -> Result<ItemContext, CapabilityError> {
        self.loads.lock().unwrap().push(reference.as_str().to_string());
        match self.behavior(reference.as_str()) {
            Behavior::LoadFails(kind) => Err(CapabilityError::new(kind, "load failed")),
            Behavior::SlowRecord(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ItemContext::new(reference.clone(), "<html>slow</html>"))
            }
            Behavior::Flaky(kind, failures) => {
                if self.attempt(reference.as_str()) <= failures {
                    Err(CapabilityError::new(kind, "flaky"))
                } else {
                    Ok(ItemContext::new(reference.clone(), "<html>ok</html>"))
                }
            }
            _ => Ok(ItemContext::new(reference.clone(), "<html>ok</html>")),
        }
    }
}

#[async_trait]
impl Extractor for ScriptedSite {
    async fn extract(
        &self,
        context: &ItemContext,
        _schema: &QuerySchema,
    ) -> Result<Option<FieldMap>, CapabilityError> {
        match self.behavior(context.reference().as_str()) {
            Behavior::NoData => Ok(None),
            Behavior::ExtractFails(kind) => Err(CapabilityError::new(kind, "extract failed")),
            _ => {
                let mut fields = FieldMap::new();
                fields.insert(
                    "title".into(),
                    FieldValue::Text(format!("Offer at {}", context.reference())),
                );
                fields.insert("duration".into(), FieldValue::Integer(12));
                Ok(Some(fields))
            }
        }
    }
}

pub struct FakeAuth {
    pub accept: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Authenticator for FakeAuth {
    async fn sign_in(&self, _credentials: &Credentials) -> Result<(), CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(())
        } else {
            Err(CapabilityError::new(FailureKind::Unauthorized, "bad password"))
        }
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn capabilities(
    listing: Arc<FakeListing>,
    site: Arc<ScriptedSite>,
    store: Arc<MemoryStore>,
) -> Capabilities {
    Capabilities {
        discovery: listing,
        loader: site.clone(),
        extractor: site,
        store,
    }
}
