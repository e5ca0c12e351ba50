//! Core booking data model for tripsync.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const CRATE_NAME: &str = "tripsync-core";

/// Signals at or below this confidence never count toward a claim.
pub const STRONG_SIGNAL_THRESHOLD: f64 = 0.5;

/// Default number of strong signals an extractor needs before claiming an email.
pub const DEFAULT_MIN_SIGNALS: usize = 2;

/// One fetched provider email. Built once per message and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEmail {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
    pub body: String,
}

impl RawEmail {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        date: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            subject: subject.into(),
            date: date.into(),
            body: body.into(),
        }
    }

    /// Sender address lowercased, with any display name removed.
    pub fn sender_address(&self) -> String {
        let from = self.from.trim();
        let addr = match (from.rfind('<'), from.rfind('>')) {
            (Some(start), Some(end)) if start < end => &from[start + 1..end],
            _ => from,
        };
        addr.trim().to_ascii_lowercase()
    }

    /// The `Date` header parsed as RFC 2822 (or RFC 3339 as a fallback).
    pub fn sent_at(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.date.trim();
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
    }

    pub fn sent_year(&self) -> i32 {
        self.sent_at()
            .map(|dt| dt.year())
            .unwrap_or_else(|| Utc::now().year())
    }

    /// Subject and body joined, used by keyword scans.
    pub fn combined_text(&self) -> String {
        format!("{}\n{}", self.subject, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub matched: bool,
    pub confidence: f64,
    pub value: Option<String>,
    pub source: String,
}

impl DetectionSignal {
    pub fn miss(source: impl Into<String>) -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            value: None,
            source: source.into(),
        }
    }

    pub fn hit(source: impl Into<String>, confidence: f64, value: Option<String>) -> Self {
        Self {
            matched: true,
            confidence: clamp_unit(confidence),
            value,
            source: source.into(),
        }
    }

    pub fn is_strong(&self) -> bool {
        self.matched && self.confidence > STRONG_SIGNAL_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Domain,
    Subject,
    Content,
    Structure,
    Brand,
}

/// Named evidence gathered for one candidate provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSignalSet {
    signals: BTreeMap<SignalKind, DetectionSignal>,
}

impl DetectionSignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: SignalKind, signal: DetectionSignal) -> Self {
        self.insert(kind, signal);
        self
    }

    pub fn insert(&mut self, kind: SignalKind, signal: DetectionSignal) {
        self.signals.insert(kind, signal);
    }

    pub fn get(&self, kind: SignalKind) -> Option<&DetectionSignal> {
        self.signals.get(&kind)
    }

    pub fn is_matched(&self, kind: SignalKind) -> bool {
        self.get(kind).map(|s| s.matched).unwrap_or(false)
    }

    pub fn strong_count(&self) -> usize {
        self.signals.values().filter(|s| s.is_strong()).count()
    }

    pub fn meets(&self, min_signals: usize) -> bool {
        self.strong_count() >= min_signals
    }

    /// Mean confidence of the strong signals, 0.0 when there are none.
    pub fn mean_strong_confidence(&self) -> f64 {
        let strong: Vec<f64> = self
            .signals
            .values()
            .filter(|s| s.is_strong())
            .map(|s| s.confidence)
            .collect();
        if strong.is_empty() {
            0.0
        } else {
            strong.iter().sum::<f64>() / strong.len() as f64
        }
    }

    /// Value carried by the `kind` signal, when it matched.
    pub fn first_value(&self, kind: SignalKind) -> Option<&str> {
        self.get(kind)
            .filter(|s| s.matched)
            .and_then(|s| s.value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SignalKind, &DetectionSignal)> {
        self.signals.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    Accommodation,
    Flight,
    Restaurant,
    Activity,
    CarRental,
    Train,
    Cruise,
}

impl BookingType {
    pub const ALL: [BookingType; 7] = [
        BookingType::Accommodation,
        BookingType::Flight,
        BookingType::Restaurant,
        BookingType::Activity,
        BookingType::CarRental,
        BookingType::Train,
        BookingType::Cruise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::Accommodation => "accommodation",
            BookingType::Flight => "flight",
            BookingType::Restaurant => "restaurant",
            BookingType::Activity => "activity",
            BookingType::CarRental => "car_rental",
            BookingType::Train => "train",
            BookingType::Cruise => "cruise",
        }
    }

    /// Lenient lookup used for model output: accepts `car rental`, `Hotel`, `lodging` etc.
    pub fn parse_loose(input: &str) -> Option<Self> {
        let norm = input
            .trim()
            .to_ascii_lowercase()
            .replace(&[' ', '-'][..], "_");
        match norm.as_str() {
            "accommodation" | "hotel" | "lodging" | "rental" | "vacation_rental" => {
                Some(BookingType::Accommodation)
            }
            "flight" | "air" | "airline" => Some(BookingType::Flight),
            "restaurant" | "dining" => Some(BookingType::Restaurant),
            "activity" | "tour" | "event" => Some(BookingType::Activity),
            "car_rental" | "car" => Some(BookingType::CarRental),
            "train" | "rail" => Some(BookingType::Train),
            "cruise" => Some(BookingType::Cruise),
            _ => None,
        }
    }
}

impl fmt::Display for BookingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Confirmed,
    Cancelled,
    Pending,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Pending => "pending",
        }
    }
}

/// One flight segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightLeg {
    pub flight_number: String,
    pub airline: Option<String>,
    pub departure_airport: Option<String>,
    pub arrival_airport: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub seat: Option<String>,
    pub cabin_class: Option<String>,
}

/// Provider-specific fields. Named fields cover the common cases per booking
/// type; `extras` holds anything else a provider exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingDetails {
    // accommodation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guests: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nights: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nightly_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaning_fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_deposit: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loyalty_number: Option<String>,

    // flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_flights: Vec<FlightLeg>,

    // restaurant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, JsonValue>,
}

impl BookingDetails {
    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.extras.insert(key.into(), value.into());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserMetadata {
    pub extractor: String,
    pub confidence: f64,
    pub parse_duration_ms: u64,
    pub parsed_at: DateTime<Utc>,
}

/// Structured result handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub provider: String,
    pub booking_type: BookingType,
    pub confirmation_number: Option<String>,
    pub status: BookingStatus,
    pub title: String,
    pub location: Location,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_price: Option<f64>,
    pub currency: Option<String>,
    pub details: BookingDetails,
    pub source_email_id: String,
    pub source_email_date: String,
    pub source_email_subject: String,
    pub parser: ParserMetadata,
}

impl BookingRecord {
    /// Minimal record for `email`; every optional field starts absent.
    pub fn new(
        provider: impl Into<String>,
        booking_type: BookingType,
        title: impl Into<String>,
        start_date: NaiveDate,
        email: &RawEmail,
    ) -> Self {
        let provider = provider.into();
        Self {
            parser: ParserMetadata {
                extractor: provider.clone(),
                confidence: 0.0,
                parse_duration_ms: 0,
                parsed_at: Utc::now(),
            },
            provider,
            booking_type,
            confirmation_number: None,
            status: BookingStatus::Confirmed,
            title: title.into(),
            location: Location::default(),
            start_date,
            end_date: None,
            start_time: None,
            end_time: None,
            total_price: None,
            currency: None,
            details: BookingDetails::default(),
            source_email_id: email.id.clone(),
            source_email_date: email.date.clone(),
            source_email_subject: email.subject.clone(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.parser.confidence = clamp_unit(confidence);
    }

    pub fn confidence(&self) -> f64 {
        self.parser.confidence
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Full,
    Incremental,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Full => "full",
            SyncKind::Incremental => "incremental",
        }
    }
}

/// Aggregate outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub run_id: Uuid,
    pub kind: SyncKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub emails_fetched: usize,
    pub emails_parsed: usize,
    pub bookings_found: usize,
    pub duplicates_skipped: usize,
    pub errors: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
}

impl SyncResult {
    pub fn start(kind: SyncKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            emails_fetched: 0,
            emails_parsed: 0,
            bookings_found: 0,
            duplicates_skipped: 0,
            errors: Vec::new(),
            success: false,
            duration_ms: 0,
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn finish(mut self, success: bool) -> Self {
        let finished_at = Utc::now();
        self.duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(finished_at);
        self.success = success;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Started,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Started => "started",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
        }
    }
}

/// Row appended to the sync telemetry log at the start and end of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTelemetry {
    pub run_id: Uuid,
    pub user_id: String,
    pub kind: SyncKind,
    pub phase: SyncPhase,
    pub recorded_at: DateTime<Utc>,
    pub emails_fetched: usize,
    pub emails_parsed: usize,
    pub bookings_found: usize,
    pub error_count: usize,
    pub first_error: Option<String>,
    pub duration_ms: u64,
}

impl SyncTelemetry {
    pub fn started(user_id: &str, result: &SyncResult) -> Self {
        Self::from_result(user_id, result, SyncPhase::Started)
    }

    pub fn finished(user_id: &str, result: &SyncResult) -> Self {
        let phase = if result.success {
            SyncPhase::Completed
        } else {
            SyncPhase::Failed
        };
        Self::from_result(user_id, result, phase)
    }

    fn from_result(user_id: &str, result: &SyncResult, phase: SyncPhase) -> Self {
        Self {
            run_id: result.run_id,
            user_id: user_id.to_string(),
            kind: result.kind,
            phase,
            recorded_at: Utc::now(),
            emails_fetched: result.emails_fetched,
            emails_parsed: result.emails_parsed,
            bookings_found: result.bookings_found,
            error_count: result.errors.len(),
            first_error: result.errors.first().cloned(),
            duration_ms: result.duration_ms,
        }
    }
}
