use std::collections::HashSet;

use async_trait::async_trait;
use pipeline_logging::pipeline_info;
use scraper::{Html, Selector};
use tokio::sync::Mutex;
use url::Url;

use super::HttpSession;
use crate::{CapabilityError, DiscoveryTrigger, FailureKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSettings {
    /// Query parameter carrying the page number.
    pub page_param: String,
    /// Selector of the item links; their `href` is the reference.
    pub reference_selector: String,
    /// Page number of the discovery URL as given.
    pub first_page: u32,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            page_param: "page".to_string(),
            reference_selector: "a[href]".to_string(),
            first_page: 1,
        }
    }
}

#[derive(Default)]
struct ListingState {
    loaded_first: bool,
    last_page: u32,
    references: Vec<String>,
    seen: HashSet<String>,
}

/// Listing paged through a query parameter. Each expansion fetches the next
/// page and appends its links; a page adding nothing new ends discovery.
pub struct PagedListing {
    session: HttpSession,
    start: Url,
    settings: ListingSettings,
    selector: Selector,
    state: Mutex<ListingState>,
}

impl PagedListing {
    pub fn new(session: HttpSession, start: Url, settings: ListingSettings) -> Result<Self, CapabilityError> {
        let selector = Selector::parse(&settings.reference_selector).map_err(|err| {
            CapabilityError::new(
                FailureKind::MissingStructure,
                format!("bad reference selector {:?}: {err}", settings.reference_selector),
            )
        })?;
        Ok(Self {
            session,
            start,
            settings,
            selector,
            state: Mutex::new(ListingState::default()),
        })
    }

    fn page_url(&self, page: u32) -> Url {
        let mut url = self.start.clone();
        let retained: Vec<(String, String)> = self
            .start
            .query_pairs()
            .filter(|(key, _)| key != self.settings.page_param.as_str())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair(&self.settings.page_param, &page.to_string());
        url
    }

    async fn ensure_first_page(&self, state: &mut ListingState) -> Result<(), CapabilityError> {
        if state.loaded_first {
            return Ok(());
        }
        let page = self.session.get(&self.start).await?;
        absorb(state, scrape_hrefs(&page.html, &self.selector));
        state.loaded_first = true;
        state.last_page = self.settings.first_page;
        Ok(())
    }
}

#[async_trait]
impl DiscoveryTrigger for PagedListing {
    async fn expand(&self) -> Result<bool, CapabilityError> {
        let mut state = self.state.lock().await;
        self.ensure_first_page(&mut state).await?;
        let next = state.last_page + 1;
        let page = match self.session.get(&self.page_url(next)).await {
            Ok(page) => page,
            // Sites answer past the last page with 404.
            Err(err) if err.kind == FailureKind::HttpStatus(404) => {
                pipeline_info!("Listing has no page {}, discovery is complete", next);
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        state.last_page = next;
        let added = absorb(&mut state, scrape_hrefs(&page.html, &self.selector));
        Ok(added > 0)
    }

    async fn collect_references(&self) -> Result<Vec<String>, CapabilityError> {
        let mut state = self.state.lock().await;
        self.ensure_first_page(&mut state).await?;
        Ok(state.references.clone())
    }
}

/// Append unseen hrefs, returning how many were new.
fn absorb(state: &mut ListingState, hrefs: Vec<String>) -> usize {
    let before = state.references.len();
    for href in hrefs {
        if state.seen.insert(href.clone()) {
            state.references.push(href);
        }
    }
    state.references.len() - before
}

fn scrape_hrefs(html: &str, selector: &Selector) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(selector)
        .filter_map(|node| node.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}
