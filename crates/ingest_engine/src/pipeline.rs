use std::sync::Arc;

use ingest_core::{RunMetrics, DEFAULT_IDENTITY_FIELD};
use pipeline_logging::{pipeline_error, pipeline_info};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    system_clock, Authenticator, Clock, Credentials, DedupAdapter, DedupFailurePolicy,
    DiscoveryTrigger, Extractor, ItemLoader, MetricsAggregator, Orchestrator, PaginationDriver,
    PaginationSettings, ProgressSink, QuerySchema, RecordSink, RetryPolicy, RunError, RunReport,
    StoreClient,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub max_expansions: u32,
    pub pagination: PaginationSettings,
    pub retry: RetryPolicy,
    pub dedup_failure: DedupFailurePolicy,
    pub items_table: String,
    pub metrics_table: String,
    pub identity_field: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_expansions: 300,
            pagination: PaginationSettings::default(),
            retry: RetryPolicy::default(),
            dedup_failure: DedupFailurePolicy::default(),
            items_table: "items".to_string(),
            metrics_table: "run_metrics".to_string(),
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
        }
    }
}

/// The collaborators one run drives.
#[derive(Clone)]
pub struct Capabilities {
    pub discovery: Arc<dyn DiscoveryTrigger>,
    pub loader: Arc<dyn ItemLoader>,
    pub extractor: Arc<dyn Extractor>,
    pub store: Arc<dyn StoreClient>,
}

struct SignIn {
    authenticator: Arc<dyn Authenticator>,
    credentials: Credentials,
}

/// One complete run: sign in, discover, ingest, flush metrics.
pub struct Pipeline {
    sign_in: Option<SignIn>,
    driver: PaginationDriver,
    orchestrator: Orchestrator,
    max_expansions: u32,
}

impl Pipeline {
    pub fn new(
        capabilities: Capabilities,
        listing_base: Url,
        schema: QuerySchema,
        settings: PipelineSettings,
    ) -> Self {
        Self::with_clock(capabilities, listing_base, schema, settings, system_clock())
    }

    pub fn with_clock(
        capabilities: Capabilities,
        listing_base: Url,
        schema: QuerySchema,
        settings: PipelineSettings,
        clock: Clock,
    ) -> Self {
        let driver = PaginationDriver::new(capabilities.discovery, listing_base, settings.pagination);
        let dedup = DedupAdapter::new(
            capabilities.store.clone(),
            settings.items_table.clone(),
            settings.dedup_failure,
        );
        let sink = RecordSink::new(
            capabilities.store.clone(),
            settings.items_table,
            settings.identity_field,
        );
        let aggregator = MetricsAggregator::new(capabilities.store, settings.metrics_table, clock);
        let orchestrator = Orchestrator::new(
            capabilities.loader,
            capabilities.extractor,
            schema,
            dedup,
            sink,
            aggregator,
            settings.retry,
        );
        Self {
            sign_in: None,
            driver,
            orchestrator,
            max_expansions: settings.max_expansions,
        }
    }

    /// Sign in with `credentials` before discovery starts.
    pub fn sign_in_with(mut self, authenticator: Arc<dyn Authenticator>, credentials: Credentials) -> Self {
        self.sign_in = Some(SignIn {
            authenticator,
            credentials,
        });
        self
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<RunReport, RunError> {
        if let Some(sign_in) = &self.sign_in {
            pipeline_info!("Attempting to sign in as {}", sign_in.credentials.identity);
            if let Err(err) = sign_in.authenticator.sign_in(&sign_in.credentials).await {
                pipeline_error!("Sign-in failed: {}", err);
                return Err(RunError::Auth(err));
            }
            pipeline_info!("Sign-in successful");
        }

        let mut metrics = RunMetrics::start(self.orchestrator.aggregator().now());
        let references = self.driver.discover_all(self.max_expansions, cancel).await;
        self.orchestrator
            .run(references, &mut metrics, cancel, progress)
            .await
    }
}
