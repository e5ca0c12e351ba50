use async_trait::async_trait;
use regex::Regex;
use tripsync_core::{BookingRecord, BookingType, RawEmail};

use super::{clean_name, confidence_for, Stay};
use crate::signals::{SignalDetector, SignalProfile, LODGING_CUES};
use crate::toolkit;
use crate::{ExtractError, Extractor};

const PROVIDER_ID: &str = "booking_com";

#[derive(Debug, Clone)]
pub struct BookingComExtractor {
    detector: SignalDetector,
    confirmation: Vec<Regex>,
    pin: Regex,
    property: Vec<Regex>,
    free_cancellation: Regex,
}

impl BookingComExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let detector = SignalDetector::new(SignalProfile {
            domains: &["booking.com"],
            subject_patterns: &[
                r"booking\s+(?:is\s+)?confirmed",
                r"your\s+booking\b",
                r"reservation\s+(?:is\s+)?confirmed",
                r"\bconfirmation\b",
                r"thanks!?\s+your\s+booking",
                r"booking\s+(?:cancel|modif)",
            ],
            brands: &["booking.com"],
            cues: LODGING_CUES,
            require_exact_domain: true,
            require_subject: true,
            ..SignalProfile::default()
        })?;
        Ok(Self {
            detector,
            confirmation: vec![
                Regex::new(
                    r"(?i:booking|confirmation)\s+(?i:number|no\.?|id)\s*[:#]?\s*(\d[\d.]{7,14}\d)",
                )?,
                Regex::new(r"(?i:confirmation|booking)\s*#\s*(\d{8,12})")?,
            ],
            pin: Regex::new(r"(?i:pin(?:\s+code)?)\s*[:#]?\s*(\d{4})\b")?,
            property: vec![
                Regex::new(r"(?i:confirmed\s+at|booking\s+at|stay\s+at|reservation\s+at)\s+(?:the\s+)?([^\n!|]+)")?,
            ],
            free_cancellation: Regex::new(
                r"(?i)free\s+cancell?ation\s+(?:until|before|by)\s+([^\n(]+)",
            )?,
        })
    }
}

#[async_trait]
impl Extractor for BookingComExtractor {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "Booking.com"
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
        let year = email.sent_year();

        let property = toolkit::labeled_value(&email.body, &["property:", "hotel:", "accommodation:"])
            .or_else(|| toolkit::capture_first(&email.subject, &self.property))
            .or_else(|| toolkit::capture_first(&email.body, &self.property))
            .and_then(|raw| clean_name(&raw));

        let mut record = BookingRecord::new(
            PROVIDER_ID,
            BookingType::Accommodation,
            property
                .clone()
                .unwrap_or_else(|| "Booking.com stay".to_string()),
            toolkit::email_date_or_today(email),
            email,
        );
        stay.apply(&mut record);
        record.status = toolkit::detect_status(email);
        record.confirmation_number = toolkit::capture_first(&email.body, &self.confirmation)
            .or_else(|| toolkit::capture_first(&email.subject, &self.confirmation));

        record.location.name = property.clone();
        record.location.address = toolkit::labeled_value(&email.body, &["address:", "location:"])
            .or_else(|| toolkit::find_street_address(&email.body));

        record.details.platform = Some("Booking.com".to_string());
        record.details.property_name = property;
        record.details.room_type =
            toolkit::labeled_value(&email.body, &["room type", "your room:", "room:"]);
        record.details.nightly_rate = super::nightly_rate(&email.body);

        if let Some(pin) = toolkit::capture_first(&email.body, std::slice::from_ref(&self.pin)) {
            record.details.insert_extra("pin_code", pin);
        }
        if let Some(until) = toolkit::capture_first(
            &email.body,
            std::slice::from_ref(&self.free_cancellation),
        )
        .and_then(|raw| toolkit::first_date(&raw, year))
        {
            record
                .details
                .insert_extra("free_cancellation_until", until.to_string());
        }

        let confidence = confidence_for(
            &signals,
            &[
                record.confirmation_number.is_some(),
                stay.check_in.is_some(),
                stay.check_out.is_some(),
                record.total_price.is_some(),
            ],
            &[
                record.details.property_name.is_some(),
                record.location.address.is_some(),
                record.details.room_type.is_some(),
                record.details.guests.is_some(),
            ],
        );
        record.set_confidence(confidence);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_confirmation_with_pin_and_cancellation_window() {
        let extractor = BookingComExtractor::new().unwrap();
        let email = RawEmail::new(
            "msg-bcom-1",
            "Booking.com <noreply@booking.com>",
            "Your booking is confirmed at Hotel Lisboa Plaza",
            "Wed, 10 Apr 2024 12:00:00 +0000",
            "Thanks, Sam! Your booking in Lisbon is confirmed.\n\
             Booking number: 3012.456.789\n\
             PIN code: 4821\n\
             Check-in: Friday, 3 May 2024 (from 15:00)\n\
             Check-out: Monday, 6 May 2024 (until 11:00)\n\
             Room type: Superior Double Room\n\
             2 adults\n\
             Address: Travessa do Salitre 7, Lisbon\n\
             Free cancellation until 1 May 2024 23:59\n\
             Total price: € 612.40",
        );
        assert!(extractor.can_parse(&email));
        let record = extractor.parse(&email).await.unwrap();

        assert_eq!(record.title, "Hotel Lisboa Plaza");
        assert_eq!(record.confirmation_number.as_deref(), Some("3012.456.789"));
        assert_eq!(record.start_date.to_string(), "2024-05-03");
        assert_eq!(record.end_date.map(|d| d.to_string()).as_deref(), Some("2024-05-06"));
        assert_eq!(record.start_time.as_deref(), Some("15:00"));
        assert_eq!(record.end_time.as_deref(), Some("11:00"));
        assert_eq!(record.total_price, Some(612.4));
        assert_eq!(record.currency.as_deref(), Some("EUR"));
        assert_eq!(record.details.room_type.as_deref(), Some("Superior Double Room"));
        assert_eq!(record.details.guests, Some(2));
        assert_eq!(record.details.nights, Some(3));
        assert_eq!(record.details.extras.get("pin_code"), Some(&serde_json::json!("4821")));
        assert_eq!(
            record.details.extras.get("free_cancellation_until"),
            Some(&serde_json::json!("2024-05-01"))
        );
        assert!(record.confidence() > 0.8);
    }

    #[test]
    fn newsletter_is_not_claimed() {
        let extractor = BookingComExtractor::new().unwrap();
        let email = RawEmail::new(
            "m",
            "deals@booking.com",
            "Last-minute deals for the weekend",
            "",
            "Save 15% on stays",
        );
        assert!(!extractor.can_parse(&email));
    }
}
