//! RON configuration for the `listing-ingest` binary.
//!
//! Secrets never live in the file: the store key and the sign-in password
//! come from the environment (a `.env` file is honoured by `main`).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ingest_engine::web::{
    AirtableSettings, FetchSettings, ListingSettings, SignInSettings, DEFAULT_API_URL,
};
use ingest_engine::{
    Credentials, DedupFailurePolicy, PaginationSettings, PipelineSettings, QuerySchema,
    RetryPolicy,
};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "ingest.ron";
pub const DEFAULT_LOG_FILE: &str = "ingest.log";

pub const ENV_API_KEY: &str = "AIRTABLE_API_KEY";
pub const ENV_BASE_ID: &str = "AIRTABLE_BASE_ID";
pub const ENV_ITEMS_TABLE: &str = "AIRTABLE_TABLE_NAME";
pub const ENV_METRICS_TABLE: &str = "AIRTABLE_TABLE_NAME_METRICS";
pub const ENV_IDENTITY: &str = "EMAIL_ADDRESS";
pub const ENV_SECRET: &str = "EMAIL_PASSWORD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// First listing page; later pages are derived from it.
    pub initial_discovery_url: String,
    pub max_expansions: u32,
    /// RON file holding the extraction schema, relative to the config file.
    pub schema_path: PathBuf,
    pub listing: ListingConfig,
    pub store: StoreConfig,
    /// No sign-in happens when absent.
    pub sign_in: Option<SignInConfig>,
    pub settle_delay_ms: u64,
    pub expand_timeout_ms: u64,
    pub retry: RetryConfig,
    pub dedup_failure: DedupFailurePolicy,
    pub fetch: FetchConfig,
    pub log_file: Option<PathBuf>,
    #[serde(skip)]
    pub secrets: Secrets,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            initial_discovery_url: String::new(),
            max_expansions: 300,
            schema_path: PathBuf::from("schema.ron"),
            listing: ListingConfig::default(),
            store: StoreConfig::default(),
            sign_in: None,
            settle_delay_ms: 250,
            expand_timeout_ms: 30_000,
            retry: RetryConfig::default(),
            dedup_failure: DedupFailurePolicy::default(),
            fetch: FetchConfig::default(),
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            secrets: Secrets::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub page_param: String,
    pub reference_selector: String,
    pub first_page: u32,
    /// Base for resolving relative item links. Defaults to the discovery URL.
    pub base_url: Option<String>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        let engine = ListingSettings::default();
        Self {
            page_param: engine.page_param,
            reference_selector: engine.reference_selector,
            first_page: engine.first_page,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub api_url: String,
    pub base_id: String,
    pub items_table: String,
    pub metrics_table: String,
    pub identity_field: String,
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let pipeline = PipelineSettings::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            base_id: String::new(),
            items_table: pipeline.items_table,
            metrics_table: pipeline.metrics_table,
            identity_field: pipeline.identity_field,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignInConfig {
    pub url: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default = "default_identity_param")]
    pub identity_param: String,
    #[serde(default = "default_secret_param")]
    pub secret_param: String,
    #[serde(default)]
    pub failure_selector: Option<String>,
}

fn default_identity_param() -> String {
    "email".to_string()
}

fn default_secret_param() -> String {
    "password".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            connect_timeout_ms: fetch.connect_timeout.as_millis() as u64,
            request_timeout_ms: fetch.request_timeout.as_millis() as u64,
            redirect_limit: fetch.redirect_limit,
            max_bytes: fetch.max_bytes,
        }
    }
}

/// Values only ever read from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub api_key: String,
    pub password: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &redacted(&self.api_key))
            .field("password", &redacted(&self.password))
            .finish()
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl AppConfig {
    /// Read `path`, overlay the environment through `env`, and validate.
    pub fn load(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig = ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.schema_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.schema_path = dir.join(&config.schema_path);
            }
        }
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Blank variables count as unset.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| env(key).filter(|value| !value.trim().is_empty());
        if let Some(value) = var(ENV_API_KEY) {
            self.secrets.api_key = value;
        }
        if let Some(value) = var(ENV_BASE_ID) {
            self.store.base_id = value;
        }
        if let Some(value) = var(ENV_ITEMS_TABLE) {
            self.store.items_table = value;
        }
        if let Some(value) = var(ENV_METRICS_TABLE) {
            self.store.metrics_table = value;
        }
        if let Some(value) = var(ENV_SECRET) {
            self.secrets.password = value;
        }
        if let (Some(sign_in), Some(value)) = (self.sign_in.as_mut(), var(ENV_IDENTITY)) {
            sign_in.identity = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_discovery_url.trim().is_empty() {
            return Err(ConfigError::Missing("initial_discovery_url"));
        }
        self.listing_url()?;
        self.listing_base()?;
        if self.listing.reference_selector.trim().is_empty() {
            return Err(ConfigError::Missing("listing.reference_selector"));
        }
        if self.listing.page_param.trim().is_empty() {
            return Err(ConfigError::Missing("listing.page_param"));
        }

        require(&self.store.base_id, "store.base_id (or AIRTABLE_BASE_ID)")?;
        require(&self.store.items_table, "store.items_table (or AIRTABLE_TABLE_NAME)")?;
        require(
            &self.store.metrics_table,
            "store.metrics_table (or AIRTABLE_TABLE_NAME_METRICS)",
        )?;
        require(&self.store.identity_field, "store.identity_field")?;
        require(&self.secrets.api_key, ENV_API_KEY)?;
        parse_url("store.api_url", &self.store.api_url)?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::Invalid {
                field: "retry.max_backoff_ms",
                message: "must not be below retry.initial_backoff_ms".to_string(),
            });
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch.max_bytes",
                message: "must be positive".to_string(),
            });
        }

        if let Some(sign_in) = &self.sign_in {
            parse_url("sign_in.url", &sign_in.url)?;
            require(&sign_in.identity, "sign_in.identity (or EMAIL_ADDRESS)")?;
            require(&self.secrets.password, ENV_SECRET)?;
        }
        Ok(())
    }

    pub fn listing_url(&self) -> Result<Url, ConfigError> {
        parse_url("initial_discovery_url", &self.initial_discovery_url)
    }

    pub fn listing_base(&self) -> Result<Url, ConfigError> {
        match &self.listing.base_url {
            Some(base) => parse_url("listing.base_url", base),
            None => self.listing_url(),
        }
    }

    pub fn listing_settings(&self) -> ListingSettings {
        ListingSettings {
            page_param: self.listing.page_param.clone(),
            reference_selector: self.listing.reference_selector.clone(),
            first_page: self.listing.first_page,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.fetch.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.fetch.request_timeout_ms),
            redirect_limit: self.fetch.redirect_limit,
            max_bytes: self.fetch.max_bytes,
            ..FetchSettings::default()
        }
    }

    pub fn airtable_settings(&self) -> Result<AirtableSettings, ConfigError> {
        Ok(AirtableSettings {
            api_url: parse_url("store.api_url", &self.store.api_url)?,
            api_key: self.secrets.api_key.clone(),
            base_id: self.store.base_id.clone(),
            identity_field: self.store.identity_field.clone(),
            request_timeout: Duration::from_millis(self.store.request_timeout_ms),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_expansions: self.max_expansions,
            pagination: PaginationSettings {
                settle_delay: Duration::from_millis(self.settle_delay_ms),
                expand_timeout: Duration::from_millis(self.expand_timeout_ms),
            },
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            },
            dedup_failure: self.dedup_failure,
            items_table: self.store.items_table.clone(),
            metrics_table: self.store.metrics_table.clone(),
            identity_field: self.store.identity_field.clone(),
        }
    }

    pub fn sign_in(&self) -> Result<Option<(SignInSettings, Credentials)>, ConfigError> {
        let Some(sign_in) = &self.sign_in else {
            return Ok(None);
        };
        let settings = SignInSettings {
            url: parse_url("sign_in.url", &sign_in.url)?,
            identity_param: sign_in.identity_param.clone(),
            secret_param: sign_in.secret_param.clone(),
            failure_selector: sign_in.failure_selector.clone(),
        };
        let credentials = Credentials {
            identity: sign_in.identity.clone(),
            secret: self.secrets.password.clone(),
        };
        Ok(Some((settings, credentials)))
    }

    pub fn load_schema(&self) -> Result<QuerySchema, ConfigError> {
        let text = fs::read_to_string(&self.schema_path).map_err(|source| ConfigError::Io {
            path: self.schema_path.clone(),
            source,
        })?;
        let schema: QuerySchema = ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: self.schema_path.clone(),
            source,
        })?;
        if schema.fields.is_empty() {
            return Err(ConfigError::Invalid {
                field: "schema_path",
                message: format!("{:?} declares no fields", self.schema_path),
            });
        }
        Ok(schema)
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(field))
    } else {
        Ok(())
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::Invalid {
        field,
        message: format!("{raw:?}: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ingest_engine::FieldKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    const MINIMAL: &str = r#"(
        initial_discovery_url: "https://offers.example.com/en/offres/recherche?q=rust",
    )"#;

    const SCHEMA: &str = r#"(
        fields: [
            (name: "title", selector: "h1", required: true),
            (name: "duration", selector: ".duration", kind: Integer),
        ],
    )"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn store_env() -> Vec<(&'static str, &'static str)> {
        vec![(ENV_API_KEY, "keyXYZ"), (ENV_BASE_ID, "appBase")]
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn minimal_file_takes_defaults_and_env() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ingest.ron", MINIMAL);

        let config = AppConfig::load(&path, env(&store_env())).unwrap();

        assert_eq!(config.max_expansions, 300);
        assert_eq!(config.dedup_failure, DedupFailurePolicy::FailClosed);
        assert_eq!(config.store.items_table, "items");
        assert_eq!(config.store.base_id, "appBase");
        assert_eq!(config.secrets.api_key, "keyXYZ");
        assert_eq!(config.schema_path, dir.path().join("schema.ron"));
        assert_eq!(config.log_file, Some(PathBuf::from(DEFAULT_LOG_FILE)));
        assert!(config.sign_in().unwrap().is_none());
        assert_eq!(config.listing_settings(), ListingSettings::default());

        let settings = config.pipeline_settings();
        assert_eq!(settings.retry, RetryPolicy::default());
        assert_eq!(settings.pagination.settle_delay, Duration::from_millis(250));
        assert_eq!(
            config.listing_base().unwrap().as_str(),
            "https://offers.example.com/en/offres/recherche?q=rust"
        );
    }

    #[test]
    fn environment_names_the_tables_and_credentials() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ingest.ron",
            r#"(
                initial_discovery_url: "https://offers.example.com/en/offres/recherche",
                max_expansions: 20,
                dedup_failure: FailOpen,
                store: (items_table: "from-file"),
                sign_in: Some((url: "https://offers.example.com/en/login")),
            )"#,
        );
        let mut vars = store_env();
        vars.extend([
            (ENV_ITEMS_TABLE, "Offers"),
            (ENV_METRICS_TABLE, "Offers Metrics"),
            (ENV_IDENTITY, "ops@example.com"),
            (ENV_SECRET, "hunter2"),
        ]);

        let config = AppConfig::load(&path, env(&vars)).unwrap();

        assert_eq!(config.max_expansions, 20);
        assert_eq!(config.dedup_failure, DedupFailurePolicy::FailOpen);
        assert_eq!(config.store.items_table, "Offers");
        assert_eq!(config.store.metrics_table, "Offers Metrics");
        let (settings, credentials) = config.sign_in().unwrap().expect("sign-in configured");
        assert_eq!(settings.url.as_str(), "https://offers.example.com/en/login");
        assert_eq!(settings.identity_param, "email");
        assert_eq!(settings.secret_param, "password");
        assert_eq!(settings.failure_selector, None);
        assert_eq!(credentials.identity, "ops@example.com");
        assert_eq!(credentials.secret, "hunter2");
    }

    #[test]
    fn missing_store_key_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ingest.ron", MINIMAL);

        let err = AppConfig::load(&path, env(&[(ENV_BASE_ID, "appBase"), (ENV_API_KEY, "  ")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::Missing(ENV_API_KEY)));
    }

    #[test]
    fn sign_in_without_password_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ingest.ron",
            r#"(
                initial_discovery_url: "https://offers.example.com/",
                sign_in: Some((url: "https://offers.example.com/login", identity: "ops@example.com")),
            )"#,
        );

        let err = AppConfig::load(&path, env(&store_env())).unwrap_err();

        assert!(matches!(err, ConfigError::Missing(ENV_SECRET)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let zero_retry = write(
            &dir,
            "zero.ron",
            r#"(initial_discovery_url: "https://offers.example.com/", retry: (max_attempts: 0))"#,
        );
        let bad_url = write(&dir, "url.ron", r#"(initial_discovery_url: "offres?page=1")"#);

        assert!(matches!(
            AppConfig::load(&zero_retry, env(&store_env())),
            Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                ..
            })
        ));
        assert!(matches!(
            AppConfig::load(&bad_url, env(&store_env())),
            Err(ConfigError::Invalid {
                field: "initial_discovery_url",
                ..
            })
        ));
    }

    #[test]
    fn unreadable_and_malformed_files_are_distinguished() {
        let dir = TempDir::new().unwrap();
        let malformed = write(&dir, "broken.ron", "(initial_discovery_url: ");

        assert!(matches!(
            AppConfig::load(&dir.path().join("absent.ron"), env(&store_env())),
            Err(ConfigError::Io { .. })
        ));
        assert!(matches!(
            AppConfig::load(&malformed, env(&store_env())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn schema_is_read_next_to_the_config() {
        let dir = TempDir::new().unwrap();
        write(&dir, "schema.ron", SCHEMA);
        let path = write(&dir, "ingest.ron", MINIMAL);

        let schema = AppConfig::load(&path, env(&store_env()))
            .unwrap()
            .load_schema()
            .unwrap();

        assert_eq!(schema.fields.len(), 2);
        assert!(schema.fields[0].required);
        assert_eq!(schema.fields[1].kind, FieldKind::Integer);
        assert_eq!(schema.fields[1].attribute, None);
    }

    #[test]
    fn empty_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "schema.ron", "(fields: [])");
        let path = write(&dir, "ingest.ron", MINIMAL);

        let err = AppConfig::load(&path, env(&store_env()))
            .unwrap()
            .load_schema()
            .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { field: "schema_path", .. }));
    }

    #[test]
    fn bundled_sample_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/ingest.ron");
        let mut vars = store_env();
        vars.extend([(ENV_IDENTITY, "ops@example.com"), (ENV_SECRET, "hunter2")]);

        let config = AppConfig::load(&path, env(&vars)).unwrap();
        let schema = config.load_schema().unwrap();

        assert_eq!(config.store.metrics_table, "Offers Metrics");
        assert_eq!(
            config.listing_base().unwrap().as_str(),
            "https://mon-vie-via.businessfrance.fr/"
        );
        assert!(config.sign_in().unwrap().is_some());
        assert!(schema.fields.iter().any(|field| field.required));
    }

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[(ENV_API_KEY, "keyXYZ"), (ENV_SECRET, "hunter2")]));

        let printed = format!("{config:?}");

        assert!(!printed.contains("keyXYZ"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
