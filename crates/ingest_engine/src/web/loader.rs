use async_trait::async_trait;
use ingest_core::CandidateReference;
use url::Url;

use super::HttpSession;
use crate::{CapabilityError, FailureKind, ItemContext, ItemLoader};

/// Loads item detail pages through the shared session.
pub struct HttpItemLoader {
    session: HttpSession,
    sign_in_url: Option<Url>,
}

impl HttpItemLoader {
    pub fn new(session: HttpSession) -> Self {
        Self {
            session,
            sign_in_url: None,
        }
    }

    /// Landing on this page instead of the item means the session expired.
    pub fn with_sign_in_url(mut self, url: Url) -> Self {
        self.sign_in_url = Some(url);
        self
    }

    fn bounced_to_sign_in(&self, final_url: &Url) -> bool {
        self.sign_in_url.as_ref().is_some_and(|sign_in| {
            sign_in.host_str() == final_url.host_str() && sign_in.path() == final_url.path()
        })
    }
}

#[async_trait]
impl ItemLoader for HttpItemLoader {
    async fn load(&self, reference: &CandidateReference) -> Result<ItemContext, CapabilityError> {
        let url = Url::parse(reference.as_str())
            .map_err(|err| CapabilityError::new(FailureKind::InvalidReference, err.to_string()))?;
        let page = self.session.get(&url).await?;
        if self.bounced_to_sign_in(&page.final_url) {
            return Err(CapabilityError::new(
                FailureKind::SessionLost,
                format!("redirected to sign-in page {}", page.final_url),
            ));
        }
        Ok(ItemContext::new(reference.clone(), page.html))
    }
}
