use std::sync::Arc;
use std::time::Duration;

use ingest_core::{canonicalize_reference, CandidateReference};
use pipeline_logging::{pipeline_error, pipeline_info, pipeline_warn};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::DiscoveryTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    /// Pause after each successful expansion so the listing can settle.
    pub settle_delay: Duration,
    /// Upper bound on a single expansion.
    pub expand_timeout: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(250),
            expand_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives "load more" on the listing and collects the visible references.
pub struct PaginationDriver {
    trigger: Arc<dyn DiscoveryTrigger>,
    base: Url,
    settings: PaginationSettings,
}

impl PaginationDriver {
    pub fn new(trigger: Arc<dyn DiscoveryTrigger>, base: Url, settings: PaginationSettings) -> Self {
        Self {
            trigger,
            base,
            settings,
        }
    }

    /// Expand up to `max_expansions` times, then read every visible reference
    /// once. Discovery problems shorten the list; they never fail the run.
    pub async fn discover_all(
        &self,
        max_expansions: u32,
        cancel: &CancellationToken,
    ) -> Vec<CandidateReference> {
        pipeline_info!("Starting to load more results (cap {})", max_expansions);
        let mut expansions = 0;
        while expansions < max_expansions {
            if cancel.is_cancelled() {
                pipeline_warn!("Discovery cancelled after {} expansions", expansions);
                break;
            }
            match tokio::time::timeout(self.settings.expand_timeout, self.trigger.expand()).await {
                Ok(Ok(true)) => {
                    expansions += 1;
                    pipeline_info!("Expansion {} of {} loaded", expansions, max_expansions);
                    tokio::time::sleep(self.settings.settle_delay).await;
                }
                Ok(Ok(false)) => {
                    pipeline_info!("No more results to load after {} expansions", expansions);
                    break;
                }
                Ok(Err(err)) => {
                    pipeline_error!("Error loading more results: {}", err);
                    break;
                }
                Err(_) => {
                    pipeline_error!(
                        "Loading more results timed out after {:?}",
                        self.settings.expand_timeout
                    );
                    break;
                }
            }
        }

        let hrefs = match self.trigger.collect_references().await {
            Ok(hrefs) => hrefs,
            Err(err) => {
                pipeline_error!("Failed to collect item references: {}", err);
                Vec::new()
            }
        };

        let references: Vec<CandidateReference> = hrefs
            .iter()
            .filter_map(|href| match canonicalize_reference(&self.base, href) {
                Ok(reference) => Some(reference),
                Err(err) => {
                    pipeline_warn!("Dropping unusable item link {:?}: {}", href, err);
                    None
                }
            })
            .collect();
        pipeline_info!("Found {} item references to process", references.len());
        references
    }
}
