use async_trait::async_trait;
use regex::Regex;
use tripsync_core::{BookingRecord, BookingType, RawEmail};

use super::{confidence_for, trailing_city, Stay, PROPERTY_TYPES};
use crate::signals::{SignalDetector, SignalProfile, LODGING_CUES};
use crate::toolkit;
use crate::{ExtractError, Extractor};

const PROVIDER_ID: &str = "airbnb";

#[derive(Debug, Clone)]
pub struct AirbnbExtractor {
    detector: SignalDetector,
    confirmation: Vec<Regex>,
    host: Regex,
}

impl AirbnbExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let detector = SignalDetector::new(SignalProfile {
            domains: &["airbnb.com", "airbnb.co.uk", "airbnb.ca", "airbnb.com.au", "airbnbmail.com"],
            subject_patterns: &[
                r"reservation\s+(?:is\s+)?confirmed",
                r"booking\s+(?:is\s+)?confirmed",
                r"your\s+(?:trip|stay|reservation)\b",
                r"itinerary",
                r"reservation\s+(?:reminder|request|cancel)",
            ],
            brands: &["airbnb"],
            cues: LODGING_CUES,
            require_exact_domain: true,
            require_subject: true,
            ..SignalProfile::default()
        })?;
        Ok(Self {
            detector,
            confirmation: vec![
                Regex::new(
                    r"(?i:confirmation|reservation)\s+(?i:code|number|#)\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{5,24})\b",
                )?,
                Regex::new(r"\b(HM[A-Z0-9]{8})\b")?,
            ],
            host: Regex::new(
                r"(?i:hosted\s+by|your\s+host(?:\s+is)?|host:)[ \t]*([A-Z][A-Za-z'-]+(?: [A-Z][A-Za-z'-]+)?)",
            )?,
        })
    }
}

#[async_trait]
impl Extractor for AirbnbExtractor {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "Airbnb"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn can_parse(&self, email: &RawEmail) -> bool {
        self.detector.claims(email)
    }

    async fn parse(&self, email: &RawEmail) -> Result<BookingRecord, ExtractError> {
        let signals = self.detector.detect(email);
        let stay = Stay::read(email);

        let listing = toolkit::subject_tail(&email.subject)
            .or_else(|| toolkit::labeled_value(&email.body, &["listing:", "your stay at"]));
        let title = listing.clone().unwrap_or_else(|| "Airbnb stay".to_string());

        let mut record = BookingRecord::new(
            PROVIDER_ID,
            BookingType::Accommodation,
            title,
            toolkit::email_date_or_today(email),
            email,
        );
        stay.apply(&mut record);
        record.status = toolkit::detect_status(email);
        record.confirmation_number = toolkit::find_code(&email.body, &self.confirmation)
            .or_else(|| toolkit::find_code(&email.subject, &self.confirmation));

        record.location.name = listing.as_deref().and_then(trailing_city);
        record.location.address = toolkit::labeled_value(&email.body, &["address:"])
            .or_else(|| toolkit::find_street_address(&email.body));

        record.details.platform = Some("Airbnb".to_string());
        record.details.property_name = listing;
        record.details.property_type =
            toolkit::first_keyword(&record.title, PROPERTY_TYPES).map(ToString::to_string);
        record.details.host_name = self
            .host
            .captures(&email.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        record.details.nightly_rate = super::nightly_rate(&email.body);
        record.details.cleaning_fee = toolkit::labeled_amount(&email.body, &["cleaning fee"]);

        let confidence = confidence_for(
            &signals,
            &[
                record.confirmation_number.is_some(),
                stay.check_in.is_some(),
                stay.check_out.is_some(),
                record.total_price.is_some(),
            ],
            &[
                record.location.name.is_some() || record.location.address.is_some(),
                record.start_time.is_some(),
                record.details.guests.is_some(),
                record.details.host_name.is_some(),
            ],
        );
        record.set_confidence(confidence);
        Ok(record)
    }
}
