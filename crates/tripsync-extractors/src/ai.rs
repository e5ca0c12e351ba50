//! Language-model fallback for emails no provider extractor claims.
//!
//! The model is asked for a fixed JSON shape. Whatever comes back is
//! validated field by field; anything unusable is dropped rather than
//! trusted. A failed call never surfaces as an error to the caller: the
//! extractor degrades to a minimal record carrying the email subject.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};
use tripsync_core::{BookingRecord, BookingType, RawEmail};

use crate::toolkit;
use crate::{ExtractError, Extractor};

pub const AI_PROVIDER_ID: &str = "ai_fallback";

/// Model output is never trusted above this.
pub const AI_CONFIDENCE_CAP: f64 = 0.7;

/// Confidence of the subject-only record produced when the model fails.
pub const MINIMAL_CONFIDENCE: f64 = 0.1;

pub const DEFAULT_AI_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_BODY_CHARS: usize = 6000;

static TRAVEL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:booking|reservation|confirmation|itinerary|flight|hotel|check-?in|boarding\s+pass|e-?ticket|trip|travel|rental|cruise|train|tour|stay)s?\b",
    )
    .expect("travel keyword regex")
});

static ISO_CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("currency regex"));

/// Keyword to booking type, checked in order.
const TYPE_HINTS: &[(&str, &str)] = &[
    ("boarding pass", "flight"),
    ("flight", "flight"),
    ("airline", "flight"),
    ("car rental", "car_rental"),
    ("rental car", "car_rental"),
    ("cruise", "cruise"),
    ("train", "train"),
    ("rail", "train"),
    ("restaurant", "restaurant"),
    ("table for", "restaurant"),
    ("hotel", "accommodation"),
    ("check-in", "accommodation"),
    ("stay", "accommodation"),
];

const RESPONSE_SHAPE: &str = r#"{
  "provider": "company that issued the booking, lowercase",
  "booking_type": "one of the booking types listed below",
  "title": "short human readable title",
  "confirmation_number": "string or null",
  "start_date": "YYYY-MM-DD",
  "end_date": "YYYY-MM-DD or null",
  "start_time": "HH:MM or null",
  "end_time": "HH:MM or null",
  "location": {"name": "string or null", "address": "string or null"},
  "total_price": "number or null",
  "currency": "ISO 4217 code or null",
  "details": {}
}"#;

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractError>;
}

#[derive(Clone)]
pub struct AiFallbackExtractor {
    model: Arc<dyn TextModel>,
    timeout: Duration,
}

impl std::fmt::Debug for AiFallbackExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiFallbackExtractor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AiFallbackExtractor {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            timeout: DEFAULT_AI_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build_prompt(email: &RawEmail) -> String {
        let booking_types = BookingType::ALL
            .iter()
            .map(BookingType::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Extract the travel booking described in the email below.\n\
             Answer with one JSON object using exactly these keys:\n{RESPONSE_SHAPE}\n\
             Booking types: {booking_types}.\n\
             Use null for anything the email does not state. Do not guess confirmation numbers.\n\n\
             From: {}\nSubject: {}\nDate: {}\n\n{}",
            email.from,
            email.subject,
            email.date,
            truncate_chars(&email.body, MAX_BODY_CHARS),
        )
    }

    /// Subject-only record used when the model call or its output fails.
    pub fn minimal_record(email: &RawEmail) -> BookingRecord {
        let title = if email.subject.trim().is_empty() {
            "Untitled booking".to_string()
        } else {
            email.subject.trim().to_string()
        };
        BookingRecord::new(
            AI_PROVIDER_ID,
            infer_type(email),
            title,
            toolkit::email_date_or_today(email),
            email,
        )
        .with_confidence(MINIMAL_CONFIDENCE)
    }

    /// Validate a raw model reply into a record.
    pub fn record_from_reply(email: &RawEmail, reply: &str) -> Result<BookingRecord, ExtractError> {
        let json = json_object_span(reply)
            .ok_or_else(|| ExtractError::Model("reply contains no JSON object".into()))?;
        let value: JsonValue = serde_json::from_str(json)
            .map_err(|e| ExtractError::Model(format!("reply is not valid JSON: {e}")))?;
        let obj = value
            .as_object()
            .ok_or_else(|| ExtractError::Model("reply is not a JSON object".into()))?;
        Ok(validate(email, obj))
    }
}

#[async_trait]
impl Extractor for AiFallbackExtractor {
    fn provider_id(&self) -> &'static str {
        AI_PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "AI Fallback"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn can_parse(&self, email: &RawEmail) -> bool {
        TRAVEL_KEYWORD.is_match(&email.subject) || TRAVEL_KEYWORD.is_match(&email.from)
    }

    async fn parse(&self, email: &RawEmail) -> Result<BookingRecord, ExtractError> {
        let prompt = Self::build_prompt(email);
        let reply = match tokio::time::timeout(self.timeout, self.model.complete(&prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                warn!(email_id = %email.id, error = %err, "ai fallback call failed");
                return Ok(Self::minimal_record(email));
            }
            Err(_) => {
                warn!(email_id = %email.id, timeout_ms = self.timeout.as_millis() as u64, "ai fallback timed out");
                return Ok(Self::minimal_record(email));
            }
        };

        match Self::record_from_reply(email, &reply) {
            Ok(record) => {
                debug!(email_id = %email.id, confidence = record.confidence(), "ai fallback parsed");
                Ok(record)
            }
            Err(err) => {
                warn!(email_id = %email.id, error = %err, "ai fallback reply rejected");
                Ok(Self::minimal_record(email))
            }
        }
    }
}

fn validate(email: &RawEmail, obj: &Map<String, JsonValue>) -> BookingRecord {
    let year = email.sent_year();

    let provider = str_field(obj, "provider")
        .map(|p| slug(&p))
        .filter(|p| !p.is_empty() && p.len() <= 40)
        .unwrap_or_else(|| AI_PROVIDER_ID.to_string());

    let stated_type = str_field(obj, "booking_type").and_then(|t| BookingType::parse_loose(&t));
    let title = str_field(obj, "title").filter(|t| t.chars().count() <= 200);
    let confirmation = str_field(obj, "confirmation_number").filter(|c| valid_confirmation(c));
    let start_date = str_field(obj, "start_date").and_then(|d| date_value(&d, year));
    let effective_start = start_date.unwrap_or_else(|| toolkit::email_date_or_today(email));
    let end_date = str_field(obj, "end_date")
        .and_then(|d| date_value(&d, year))
        .filter(|end| *end >= effective_start);
    let start_time = str_field(obj, "start_time").and_then(|t| toolkit::parse_time(&t));
    let end_time = str_field(obj, "end_time").and_then(|t| toolkit::parse_time(&t));
    let price = obj.get("total_price").and_then(amount_value);
    let currency = str_field(obj, "currency")
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| ISO_CURRENCY.is_match(c));

    let mut record = BookingRecord::new(
        provider,
        stated_type.unwrap_or_else(|| infer_type(email)),
        title.clone().unwrap_or_else(|| {
            Some(email.subject.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or("Untitled booking")
                .to_string()
        }),
        effective_start,
        email,
    );
    record.status = toolkit::detect_status(email);
    record.confirmation_number = confirmation;
    record.end_date = end_date;
    record.start_time = start_time;
    record.end_time = end_time;
    record.total_price = price;
    record.currency = currency;

    match obj.get("location") {
        Some(JsonValue::Object(loc)) => {
            record.location.name = str_field(loc, "name");
            record.location.address = str_field(loc, "address");
        }
        Some(JsonValue::String(name)) => record.location.name = clean_str(name),
        _ => {}
    }

    if let Some(JsonValue::Object(details)) = obj.get("details") {
        apply_details(&mut record, details);
    }

    let required = [
        stated_type.is_some(),
        title.is_some(),
        start_date.is_some(),
        record.confirmation_number.is_some(),
    ];
    let optional = [
        record.end_date.is_some(),
        record.start_time.is_some(),
        record.location.name.is_some() || record.location.address.is_some(),
        record.total_price.is_some(),
        record.currency.is_some(),
    ];
    let score = 0.6 * ratio(&required) + 0.4 * ratio(&optional);
    record.set_confidence(score.min(AI_CONFIDENCE_CAP));
    record
}

fn apply_details(record: &mut BookingRecord, details: &Map<String, JsonValue>) {
    for (key, value) in details {
        if value.is_null() {
            continue;
        }
        let d = &mut record.details;
        match key.as_str() {
            "guests" => d.guests = count_value(value),
            "nights" => d.nights = count_value(value),
            "party_size" => d.party_size = count_value(value),
            "room_type" => d.room_type = value.as_str().and_then(clean_str),
            "property_name" => d.property_name = value.as_str().and_then(clean_str),
            "property_type" => d.property_type = value.as_str().and_then(clean_str),
            "host_name" => d.host_name = value.as_str().and_then(clean_str),
            "airline" => d.airline = value.as_str().and_then(clean_str),
            "cuisine" => d.cuisine = value.as_str().and_then(clean_str),
            "meal_period" => d.meal_period = value.as_str().and_then(clean_str),
            "loyalty_number" => d.loyalty_number = value.as_str().and_then(clean_str),
            _ => d.insert_extra(key.clone(), value.clone()),
        }
    }
}

/// Non-empty string that is not a placeholder like `"null"` or `"N/A"`.
fn str_field(obj: &Map<String, JsonValue>, key: &str) -> Option<String> {
    obj.get(key)?.as_str().and_then(clean_str)
}

fn clean_str(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if trimmed.is_empty() || matches!(lower.as_str(), "null" | "none" | "n/a" | "unknown") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn date_value(raw: &str, year: i32) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| toolkit::parse_date_with_year(raw, year))
}

fn amount_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v >= 0.0),
        JsonValue::String(s) => toolkit::parse_amount(s),
        _ => None,
    }
}

fn count_value(value: &JsonValue) -> Option<u32> {
    let count = match value {
        JsonValue::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    count.filter(|v| *v > 0)
}

fn valid_confirmation(code: &str) -> bool {
    (3..=40).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn ratio(flags: &[bool]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    flags.iter().filter(|f| **f).count() as f64 / flags.len() as f64
}

fn infer_type(email: &RawEmail) -> BookingType {
    toolkit::first_keyword(&email.combined_text(), TYPE_HINTS)
        .and_then(BookingType::parse_loose)
        .unwrap_or(BookingType::Activity)
}

/// Span from the first `{` to the last `}`; models like to wrap JSON in prose or fences.
fn json_object_span(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
