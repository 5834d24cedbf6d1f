use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use super::HttpSession;
use crate::{Authenticator, CapabilityError, Credentials, FailureKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInSettings {
    pub url: Url,
    /// Form field names of the identity and the secret.
    pub identity_param: String,
    pub secret_param: String,
    /// Selector that only matches when the sign-in was rejected.
    pub failure_selector: Option<String>,
}

/// Signs in by posting the credential form; the session keeps the cookie.
pub struct FormSignIn {
    session: HttpSession,
    settings: SignInSettings,
    failure_selector: Option<Selector>,
}

impl FormSignIn {
    pub fn new(session: HttpSession, settings: SignInSettings) -> Result<Self, CapabilityError> {
        let failure_selector = settings
            .failure_selector
            .as_deref()
            .map(Selector::parse)
            .transpose()
            .map_err(|err| {
                CapabilityError::new(
                    FailureKind::MissingStructure,
                    format!("bad failure selector: {err}"),
                )
            })?;
        Ok(Self {
            session,
            settings,
            failure_selector,
        })
    }

    fn rejected(&self, html: &str) -> bool {
        match &self.failure_selector {
            Some(selector) => Html::parse_document(html).select(selector).next().is_some(),
            None => false,
        }
    }
}

#[async_trait]
impl Authenticator for FormSignIn {
    async fn sign_in(&self, credentials: &Credentials) -> Result<(), CapabilityError> {
        let page = self
            .session
            .post_form(
                &self.settings.url,
                &[
                    (self.settings.identity_param.as_str(), credentials.identity.as_str()),
                    (self.settings.secret_param.as_str(), credentials.secret.as_str()),
                ],
            )
            .await?;
        if self.rejected(&page.html) {
            return Err(CapabilityError::new(
                FailureKind::Unauthorized,
                format!("sign-in rejected for {}", credentials.identity),
            ));
        }
        Ok(())
    }
}
