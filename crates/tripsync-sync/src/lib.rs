//! Mail-to-booking sync: configuration, persistence sinks, the sync engine
//! and its cron scheduler.

pub mod config;
pub mod engine;
pub mod sink;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use tripsync_core::SyncResult;
use tripsync_extractors::{AiFallbackExtractor, ExtractorRegistry, OpenAiTextModel};
use tripsync_storage::{
    ApiClient, ApiError, GmailClient, HttpClientConfig, MailApi, MailMessage, MessagePage,
};

pub use config::{QueryPlan, SearchQuery, SyncConfig};
pub use engine::{EngineSettings, SyncEngine, SyncProgressFn};
pub use sink::{BookingSink, MemoryBookingSink, PgBookingSink, SinkError};

pub const CRATE_NAME: &str = "tripsync-sync";

/// Stands in for the mail API when no access token is configured, so the
/// run fails through the same systemic-error path as a rejected token.
#[derive(Debug, Default)]
pub struct MissingCredential;

#[async_trait]
impl MailApi for MissingCredential {
    async fn list_messages(
        &self,
        _query: &str,
        _page_size: u32,
        _page_token: Option<&str>,
    ) -> Result<MessagePage, ApiError> {
        Err(ApiError::Unauthorized {
            url: "GMAIL_ACCESS_TOKEN not set".to_string(),
        })
    }

    async fn get_message(&self, _id: &str) -> Result<MailMessage, ApiError> {
        Err(ApiError::Unauthorized {
            url: "GMAIL_ACCESS_TOKEN not set".to_string(),
        })
    }
}

/// Wire an engine from configuration: Gmail client, default extractors, the
/// OpenAI fallback when a key is present, and the query plan.
pub fn build_engine(config: &SyncConfig, sink: Arc<dyn BookingSink>) -> Result<SyncEngine> {
    let api = ApiClient::new(HttpClientConfig {
        timeout: config.call_timeout,
        ..Default::default()
    })?;

    let mail: Arc<dyn MailApi> = match &config.gmail_access_token {
        Some(token) => Arc::new(GmailClient::new(
            api.clone(),
            config.gmail_api_base.clone(),
            token.clone(),
        )),
        None => {
            warn!("GMAIL_ACCESS_TOKEN not set; syncs will fail");
            Arc::new(MissingCredential)
        }
    };

    let registry = ExtractorRegistry::with_defaults().context("building extractor registry")?;
    let plan = QueryPlan::load(config)?;

    let mut engine = SyncEngine::new(config.user_id.clone(), mail, Arc::new(registry), sink)
        .with_query_plan(plan)
        .with_settings(EngineSettings::from(config));

    match ai_fallback(config, api) {
        Some(fallback) => engine = engine.with_fallback(Arc::new(fallback)),
        None => info!("OPENAI_API_KEY not set; AI fallback disabled"),
    }
    Ok(engine)
}

/// The OpenAI-backed fallback extractor, when an API key is configured.
pub fn ai_fallback(config: &SyncConfig, api: ApiClient) -> Option<AiFallbackExtractor> {
    let key = config.openai_api_key.as_ref()?;
    let model = OpenAiTextModel::new(api, key.clone()).with_model(config.openai_model.clone());
    Some(AiFallbackExtractor::new(Arc::new(model)).with_timeout(config.call_timeout))
}

/// One sync against the configured Postgres sink.
pub async fn run_sync_once_from_env(full: bool) -> Result<SyncResult> {
    let config = SyncConfig::from_env();
    let sink = PgBookingSink::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    let engine = build_engine(&config, Arc::new(sink))?;
    Ok(if full {
        engine.full_sync().await
    } else {
        engine.incremental_sync().await
    })
}

/// Cron scheduler running incremental syncs, when enabled.
pub async fn maybe_build_scheduler(
    config: &SyncConfig,
    engine: Arc<SyncEngine>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = config.sync_cron.as_str();
    let job = Job::new_async(cron, move |_uuid, _l| {
        let engine = engine.clone();
        Box::pin(async move {
            let result = engine.incremental_sync().await;
            if result.success {
                info!(found = result.bookings_found, "scheduled sync finished");
            } else {
                warn!(errors = ?result.errors, "scheduled sync failed");
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}
