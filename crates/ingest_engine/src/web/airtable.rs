use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use super::session::map_reqwest_error;
use crate::{CapabilityError, FailureKind, StoreClient};

pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirtableSettings {
    pub api_url: Url,
    pub api_key: String,
    pub base_id: String,
    /// Column compared against the identity in lookups.
    pub identity_field: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RecordList {
    records: Vec<Value>,
}

/// Store client for an Airtable base: one table per `table` key.
#[derive(Debug, Clone)]
pub struct AirtableClient {
    client: reqwest::Client,
    settings: AirtableSettings,
}

impl AirtableClient {
    pub fn new(settings: AirtableSettings) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| CapabilityError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn table_url(&self, table: &str) -> Result<Url, CapabilityError> {
        let mut url = self.settings.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CapabilityError::new(
                    FailureKind::InvalidReference,
                    format!("api url {} cannot take a path", self.settings.api_url),
                )
            })?
            .pop_if_empty()
            .push(&self.settings.base_id)
            .push(table);
        Ok(url)
    }

    fn identity_formula(&self, identity: &str) -> String {
        format!(
            "{{{}}} = '{}'",
            self.settings.identity_field,
            escape_formula_string(identity)
        )
    }
}

#[async_trait]
impl StoreClient for AirtableClient {
    async fn lookup(&self, table: &str, identity: &str) -> Result<bool, CapabilityError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("filterByFormula", &self.identity_formula(identity))
            .append_pair("maxRecords", "1")
            .append_pair("fields[]", &self.settings.identity_field);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body = read_success_body(response).await?;
        let list: RecordList = serde_json::from_slice(&body)
            .map_err(|err| CapabilityError::new(FailureKind::Serialization, err.to_string()))?;
        Ok(!list.records.is_empty())
    }

    async fn insert(&self, table: &str, fields: Map<String, Value>) -> Result<(), CapabilityError> {
        let url = self.table_url(table)?;
        let payload = json!({ "fields": fields, "typecast": true });
        let body = serde_json::to_vec(&payload)
            .map_err(|err| CapabilityError::new(FailureKind::Serialization, err.to_string()))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_success_body(response).await?;
        Ok(())
    }
}

async fn read_success_body(response: Response) -> Result<Vec<u8>, CapabilityError> {
    let status = response.status();
    let body = response.bytes().await.map_err(map_reqwest_error)?;
    if status.is_success() {
        return Ok(body.to_vec());
    }
    let detail = String::from_utf8_lossy(&body).chars().take(300).collect::<String>();
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Unauthorized,
        other => FailureKind::HttpStatus(other.as_u16()),
    };
    Err(CapabilityError::new(kind, format!("{status}: {detail}")))
}

/// Quote-safe string literal body for an Airtable formula.
pub(crate) fn escape_formula_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
