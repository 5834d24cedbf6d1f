use std::sync::Arc;

use anyhow::Context;
use ingest_engine::web::{
    AirtableClient, FormSignIn, HttpItemLoader, HttpSession, PagedListing, SelectorExtractor,
};
use ingest_engine::{Capabilities, Pipeline};
use pipeline_logging::pipeline_info;

use crate::config::AppConfig;

/// Build the HTTP capabilities and the pipeline that drives them. Sign-in,
/// listing and item pages share one cookie session.
pub fn build_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
    let schema = config.load_schema()?;
    pipeline_info!(
        "Loaded extraction schema with {} fields from {:?}",
        schema.fields.len(),
        config.schema_path
    );

    let session = HttpSession::new(config.fetch_settings()).context("failed to build HTTP session")?;
    let listing = PagedListing::new(session.clone(), config.listing_url()?, config.listing_settings())
        .context("invalid listing settings")?;
    let sign_in = config.sign_in()?;
    let mut loader = HttpItemLoader::new(session.clone());
    if let Some((settings, _)) = &sign_in {
        loader = loader.with_sign_in_url(settings.url.clone());
    }
    let store = AirtableClient::new(config.airtable_settings()?)
        .context("failed to build store client")?;

    let capabilities = Capabilities {
        discovery: Arc::new(listing),
        loader: Arc::new(loader),
        extractor: Arc::new(SelectorExtractor),
        store: Arc::new(store),
    };
    let mut pipeline = Pipeline::new(
        capabilities,
        config.listing_base()?,
        schema,
        config.pipeline_settings(),
    );
    if let Some((settings, credentials)) = sign_in {
        let auth = FormSignIn::new(session, settings).context("invalid sign-in settings")?;
        pipeline = pipeline.sign_in_with(Arc::new(auth), credentials);
    }
    Ok(pipeline)
}
