use std::cmp::Reverse;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tripsync_core::{BookingRecord, RawEmail};

use crate::{default_extractors, ExtractError, Extractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

pub type ProgressFn<'a> = dyn Fn(BatchProgress) + Send + Sync + 'a;

/// Extractors keyed by provider id, plus the same set in selection order.
///
/// Registration is expected to finish before any parsing starts; parsing
/// only reads.
#[derive(Default)]
pub struct ExtractorRegistry {
    by_id: IndexMap<&'static str, Arc<dyn Extractor>>,
    ordered: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Result<Self, ExtractError> {
        let mut registry = Self::new();
        for extractor in default_extractors()? {
            registry.register(Arc::from(extractor));
        }
        Ok(registry)
    }

    /// Insert or replace by provider id. Returns the replaced extractor.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) -> Option<Arc<dyn Extractor>> {
        let id = extractor.provider_id();
        let previous = self.by_id.insert(id, extractor);
        if previous.is_some() {
            warn!(provider_id = id, "replacing registered extractor");
        }
        self.reorder();
        previous
    }

    pub fn unregister(&mut self, provider_id: &str) -> Option<Arc<dyn Extractor>> {
        let removed = self.by_id.shift_remove(provider_id);
        if removed.is_some() {
            self.reorder();
        }
        removed
    }

    // Stable sort: equal priorities keep registration order.
    fn reorder(&mut self) {
        let mut ordered: Vec<Arc<dyn Extractor>> = self.by_id.values().cloned().collect();
        ordered.sort_by_key(|e| Reverse(e.priority()));
        self.ordered = ordered;
    }

    pub fn get(&self, provider_id: &str) -> Option<&Arc<dyn Extractor>> {
        self.by_id.get(provider_id)
    }

    /// `(provider_id, display_name, priority)` in selection order.
    pub fn providers(&self) -> Vec<(&'static str, &'static str, i32)> {
        self.ordered
            .iter()
            .map(|e| (e.provider_id(), e.display_name(), e.priority()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn find_best(&self, email: &RawEmail) -> Option<&Arc<dyn Extractor>> {
        self.ordered.iter().find(|e| claims(e.as_ref(), email))
    }

    pub async fn parse_one(
        &self,
        email: &RawEmail,
        fallback: Option<&dyn Extractor>,
    ) -> Option<BookingRecord> {
        if let Some(extractor) = self.find_best(email) {
            if let Some(record) = run_extractor(extractor.as_ref(), email).await {
                return Some(record);
            }
        }

        let fallback = fallback?;
        if !claims(fallback, email) {
            debug!(email_id = %email.id, "no extractor claimed email");
            return None;
        }
        run_extractor(fallback, email).await
    }

    /// Parse `emails` in chunks of `concurrency`. The output lines up with
    /// the input; emails left unscheduled after cancellation map to `None`.
    pub async fn parse_batch(
        &self,
        emails: &[RawEmail],
        concurrency: usize,
        fallback: Option<&dyn Extractor>,
        on_progress: Option<&ProgressFn<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Vec<Option<BookingRecord>> {
        let total = emails.len();
        let mut results = Vec::with_capacity(total);

        for chunk in emails.chunks(concurrency.max(1)) {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(completed = results.len(), total, "batch cancelled");
                break;
            }
            let parsed = join_all(chunk.iter().map(|email| self.parse_one(email, fallback))).await;
            results.extend(parsed);
            if let Some(report) = on_progress {
                report(BatchProgress {
                    completed: results.len(),
                    total,
                });
            }
        }

        results.resize_with(total, || None);
        results
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.ordered.iter().map(|e| e.provider_id()))
            .finish()
    }
}

fn claims(extractor: &dyn Extractor, email: &RawEmail) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(|| extractor.can_parse(email))) {
        Ok(claimed) => claimed,
        Err(_) => {
            warn!(provider_id = extractor.provider_id(), email_id = %email.id, "can_parse panicked");
            false
        }
    }
}

async fn run_extractor(extractor: &dyn Extractor, email: &RawEmail) -> Option<BookingRecord> {
    let provider_id = extractor.provider_id();
    let started = Instant::now();
    match AssertUnwindSafe(extractor.parse(email)).catch_unwind().await {
        Ok(Ok(mut record)) => {
            record.parser.extractor = provider_id.to_string();
            record.parser.parse_duration_ms = started.elapsed().as_millis() as u64;
            record.parser.parsed_at = Utc::now();
            let confidence = record.confidence();
            record.set_confidence(confidence);
            if record.provider.trim().is_empty() {
                record.provider = provider_id.to_string();
            }
            debug!(provider_id, email_id = %email.id, confidence = record.confidence(), "parsed booking");
            Some(record)
        }
        Ok(Err(err)) => {
            warn!(provider_id, email_id = %email.id, error = %err, "extractor failed");
            None
        }
        Err(_) => {
            warn!(provider_id, email_id = %email.id, "extractor panicked");
            None
        }
    }
}
