use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tripsync_core::{SyncKind, SyncResult, SyncTelemetry};
use tripsync_extractors::{Extractor, ExtractorRegistry};
use tripsync_storage::{ApiError, ConfirmationHash, MailApi};

use crate::config::{QueryPlan, SearchQuery, SyncConfig};
use crate::sink::{BookingSink, SinkError};

/// Called after every processed message with the running totals.
pub type SyncProgressFn = dyn Fn(&SyncResult) + Send + Sync;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub page_size: u32,
    pub max_results: usize,
    pub request_delay: Duration,
    pub call_timeout: Duration,
    pub lookback_days: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for EngineSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            max_results: config.max_results,
            request_delay: config.request_delay,
            call_timeout: config.call_timeout,
            lookback_days: config.lookback_days,
        }
    }
}

/// Stops the whole run: credential rejected or sink unreachable.
#[derive(Debug)]
struct Abort(String);

pub struct SyncEngine {
    user_id: String,
    mail: Arc<dyn MailApi>,
    registry: Arc<ExtractorRegistry>,
    fallback: Option<Arc<dyn Extractor>>,
    sink: Arc<dyn BookingSink>,
    plan: QueryPlan,
    settings: EngineSettings,
    progress: Option<Arc<SyncProgressFn>>,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        user_id: impl Into<String>,
        mail: Arc<dyn MailApi>,
        registry: Arc<ExtractorRegistry>,
        sink: Arc<dyn BookingSink>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            mail,
            registry,
            fallback: None,
            sink,
            plan: QueryPlan::builtin(),
            settings: EngineSettings::default(),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Extractor>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_query_plan(mut self, plan: QueryPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, progress: Arc<SyncProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn full_sync(&self) -> SyncResult {
        let floor = (Utc::now() - chrono::Duration::days(self.settings.lookback_days)).date_naive();
        let queries = self.plan.full_queries(floor);
        self.run(SyncKind::Full, queries).await
    }

    /// Mail newer than the last successful sync; a full sync when there is none.
    pub async fn incremental_sync(&self) -> SyncResult {
        match self.sink.last_sync_at(&self.user_id).await {
            Ok(None) => {
                info!(user_id = %self.user_id, "no previous sync recorded; running full sync");
                self.full_sync().await
            }
            Ok(Some(since)) => {
                let query = self.plan.incremental_query(since);
                self.run(SyncKind::Incremental, vec![query]).await
            }
            Err(err) => {
                error!(user_id = %self.user_id, error = %err, "could not read last sync timestamp");
                let mut result = SyncResult::start(SyncKind::Incremental);
                self.record_telemetry(SyncTelemetry::started(&self.user_id, &result))
                    .await;
                result.record_error(format!("reading last sync timestamp: {err}"));
                let result = result.finish(false);
                self.record_telemetry(SyncTelemetry::finished(&self.user_id, &result))
                    .await;
                result
            }
        }
    }

    async fn run(&self, kind: SyncKind, queries: Vec<SearchQuery>) -> SyncResult {
        let mut result = SyncResult::start(kind);
        let span = info_span!(
            "sync_run",
            user_id = %self.user_id,
            kind = kind.as_str(),
            run_id = %result.run_id
        );

        async move {
            let started_at = result.started_at;
            let mut aborted = false;

            if let Err(err) = self
                .sink
                .append_telemetry(&SyncTelemetry::started(&self.user_id, &result))
                .await
            {
                if let Err(Abort(message)) =
                    self.fold_sink_error(&mut result, "recording sync start", err)
                {
                    error!(%message, "sync aborted");
                    result.record_error(message);
                    aborted = true;
                }
            }

            let mut seen = HashSet::new();
            if !aborted {
                for query in &queries {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    if let Err(Abort(message)) = self.run_query(query, &mut seen, &mut result).await {
                        error!(query = %query.name, %message, "sync aborted");
                        result.record_error(message);
                        aborted = true;
                        break;
                    }
                }
            }

            let cancelled = self.cancel.is_cancelled();
            if cancelled {
                warn!("sync cancelled before completion");
                result.record_error("sync cancelled");
            }

            let mut success = !aborted && !cancelled;
            if success {
                if let Err(err) = self.sink.set_last_sync_at(&self.user_id, started_at).await {
                    error!(error = %err, "could not store last sync timestamp");
                    result.record_error(format!("storing last sync timestamp: {err}"));
                    success = false;
                }
            }

            let result = result.finish(success);
            self.record_telemetry(SyncTelemetry::finished(&self.user_id, &result))
                .await;
            info!(
                fetched = result.emails_fetched,
                parsed = result.emails_parsed,
                found = result.bookings_found,
                duplicates = result.duplicates_skipped,
                errors = result.errors.len(),
                success = result.success,
                duration_ms = result.duration_ms,
                "sync finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Walk one search query page by page. Pagination is sequential since
    /// each page token comes from the previous response.
    async fn run_query(
        &self,
        query: &SearchQuery,
        seen: &mut HashSet<String>,
        result: &mut SyncResult,
    ) -> Result<(), Abort> {
        let mut page_token: Option<String> = None;
        let mut listed = 0usize;

        loop {
            if self.cancel.is_cancelled() || listed >= self.settings.max_results {
                return Ok(());
            }
            let remaining = (self.settings.max_results - listed).min(u32::MAX as usize) as u32;
            let page_size = self.settings.page_size.min(remaining);

            let page = self
                .call(self.mail.list_messages(&query.query, page_size, page_token.as_deref()))
                .await;
            let page = match page {
                Ok(page) => page,
                Err(err) if err.is_systemic() => {
                    return Err(Abort(format!("listing {}: {err}", query.name)))
                }
                Err(err) => {
                    warn!(query = %query.name, error = %err, "listing messages failed");
                    result.record_error(format!("listing {}: {err}", query.name));
                    return Ok(());
                }
            };
            debug!(query = %query.name, count = page.messages.len(), "fetched message page");

            for message in page.messages {
                if self.cancel.is_cancelled() || listed >= self.settings.max_results {
                    return Ok(());
                }
                listed += 1;
                if !seen.insert(message.id.clone()) {
                    continue;
                }
                tokio::time::sleep(self.settings.request_delay).await;
                self.process_message(&message.id, result).await?;
                if let Some(progress) = &self.progress {
                    progress(result);
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(()),
            }
        }
    }

    async fn process_message(&self, id: &str, result: &mut SyncResult) -> Result<(), Abort> {
        let message = match self.call(self.mail.get_message(id)).await {
            Ok(message) => message,
            Err(err) if err.is_systemic() => return Err(Abort(format!("fetching {id}: {err}"))),
            Err(err) => {
                warn!(email_id = id, error = %err, "fetching message failed");
                result.record_error(format!("fetching {id}: {err}"));
                return Ok(());
            }
        };
        result.emails_fetched += 1;

        let email = match message.to_raw_email() {
            Ok(email) => email,
            Err(err) => {
                warn!(email_id = id, error = %err, "decoding message failed");
                result.record_error(format!("decoding {id}: {err}"));
                return Ok(());
            }
        };

        let Some(record) = self.registry.parse_one(&email, self.fallback.as_deref()).await else {
            debug!(email_id = id, "no booking found");
            return Ok(());
        };
        result.emails_parsed += 1;

        let hash = ConfirmationHash::for_record(&record);
        match self.sink.exists(&hash).await {
            Ok(true) => {
                result.duplicates_skipped += 1;
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => return self.fold_sink_error(result, &format!("checking {id}"), err),
        }

        match self.sink.insert(&self.user_id, &hash, &record).await {
            Ok(true) => {
                result.bookings_found += 1;
                info!(
                    email_id = id,
                    provider_id = %record.provider,
                    confirmation_hash = %hash,
                    confidence = record.confidence(),
                    "stored booking"
                );
            }
            Ok(false) => result.duplicates_skipped += 1,
            Err(err) => return self.fold_sink_error(result, &format!("storing {id}"), err),
        }
        Ok(())
    }

    /// External call bounded by the configured timeout.
    async fn call<T, F>(&self, fut: F) -> Result<T, ApiError>
    where
        F: std::future::Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ApiError::Timeout(self.settings.call_timeout)),
        }
    }

    fn fold_sink_error(
        &self,
        result: &mut SyncResult,
        context: &str,
        err: SinkError,
    ) -> Result<(), Abort> {
        if err.is_systemic() {
            return Err(Abort(format!("{context}: {err}")));
        }
        warn!(error = %err, "{context} failed");
        result.record_error(format!("{context}: {err}"));
        Ok(())
    }

    async fn record_telemetry(&self, telemetry: SyncTelemetry) {
        if let Err(err) = self.sink.append_telemetry(&telemetry).await {
            warn!(error = %err, phase = telemetry.phase.as_str(), "could not record sync telemetry");
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("user_id", &self.user_id)
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
