use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, StatusCode};
use url::Url;

use crate::{CapabilityError, FailureKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
        }
    }
}

/// A fetched HTML page and where it ended up after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub final_url: Url,
    pub html: String,
}

/// Cookie-carrying HTTP session shared by sign-in, listing and item loading.
///
/// Clones share the same cookie jar.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpSession {
    pub fn new(settings: FetchSettings) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .cookie_store(true)
            .build()
            .map_err(|err| CapabilityError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client, settings })
    }

    pub async fn get(&self, url: &Url) -> Result<Page, CapabilityError> {
        self.fetch(self.client.get(url.clone())).await
    }

    /// POST an url-encoded form.
    pub async fn post_form(&self, url: &Url, pairs: &[(&str, &str)]) -> Result<Page, CapabilityError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
        self.fetch(request).await
    }

    async fn fetch(&self, request: RequestBuilder) -> Result<Page, CapabilityError> {
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CapabilityError::new(FailureKind::Unauthorized, status.to_string()));
        }
        if status.is_redirection() {
            let target = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("<none>");
            return Err(CapabilityError::new(
                FailureKind::RedirectLimitExceeded,
                format!("stopped at redirect to {target}"),
            ));
        }
        if !status.is_success() {
            return Err(CapabilityError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, Some(content_len)));
            }
        }

        if let Some(ct) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            if !self.is_content_type_allowed(ct) {
                return Err(CapabilityError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let final_url = response.url().clone();
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, Some(next_len)));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Page {
            final_url,
            html: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }
}

fn too_large(max_bytes: u64, actual: Option<u64>) -> CapabilityError {
    CapabilityError::new(
        FailureKind::TooLarge { max_bytes, actual },
        "response too large",
    )
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() {
        return CapabilityError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return CapabilityError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    CapabilityError::new(FailureKind::Network, err.to_string())
}
