use async_trait::async_trait;
use regex::Regex;
use tripsync_core::{BookingRecord, BookingType, RawEmail};

use super::{clean_name, confidence_for, Stay, PROPERTY_TYPES};
use crate::signals::{domain_matches, sender_domain, SignalDetector, SignalProfile, LODGING_CUES};
use crate::toolkit;
use crate::{ExtractError, Extractor};

const PROVIDER_ID: &str = "vacation_rental";

/// Rental platforms: display name, sender domains, brand keyword.
const PLATFORMS: &[(&str, &[&str], &str)] = &[
    ("Vrbo", &["vrbo.com"], "vrbo"),
    ("HomeAway", &["homeaway.com"], "homeaway"),
    ("Vacasa", &["vacasa.com"], "vacasa"),
    ("Evolve", &["evolve.com", "evolvevacationrental.com"], "evolve vacation"),
    ("Sonder", &["sonder.com"], "sonder"),
    ("Stayz", &["stayz.com.au"], "stayz"),
    ("TurnKey", &["turnkeyvr.com"], "turnkey vacation"),
];

const RENTAL_SUBJECTS: &[&str] = &[
    r"reservation\s+(?:is\s+)?confirmed",
    r"booking\s+(?:is\s+)?confirmed",
    r"your\s+(?:trip|stay|reservation|vacation)\b",
    r"payment\s+(?:received|confirmation)",
    r"(?:arrival|check-?in)\s+(?:instructions|details)",
];

const AMENITIES: &[(&str, &str)] = &[
    ("wifi", "wifi"),
    ("wi-fi", "wifi"),
    ("pool", "pool"),
    ("hot tub", "hot tub"),
    ("jacuzzi", "hot tub"),
    ("parking", "parking"),
    ("kitchen", "kitchen"),
    ("washer", "washer"),
    ("dryer", "dryer"),
    ("air conditioning", "air conditioning"),
    ("fireplace", "fireplace"),
    ("grill", "grill"),
    ("bbq", "grill"),
    ("pet friendly", "pet friendly"),
    ("pets allowed", "pet friendly"),
    ("beach access", "beach access"),
    ("ev charger", "ev charger"),
];

#[derive(Debug, Clone)]
pub struct VacationRentalExtractor {
    detector: SignalDetector,
    confirmation: Vec<Regex>,
    property: Regex,
    host: Regex,
}

impl VacationRentalExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let domains: Vec<&str> = PLATFORMS.iter().flat_map(|(_, d, _)| d.iter().copied()).collect();
        let brands: Vec<&str> = PLATFORMS.iter().map(|(_, _, b)| *b).collect();
        let detector = SignalDetector::new(SignalProfile {
            domains: &domains,
            subject_patterns: RENTAL_SUBJECTS,
            brands: &brands,
            cues: LODGING_CUES,
            require_identity: true,
            ..SignalProfile::default()
        })?;
        Ok(Self {
            detector,
            confirmation: vec![Regex::new(
                r"(?i:reservation\s+id|confirmation|booking\s+(?:id|number)|reservation\s+(?:number|#))\s*(?i:number|#|code)?\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{4,20})\b",
            )?],
            property: Regex::new(
                r"(?i:stay\s+at|booking\s+at|reservation\s+(?:at|for)|trip\s+to|welcome\s+to)\s+(?:the\s+)?([^\n!|]+)",
            )?,
            host: Regex::new(
                r"(?i:hosted\s+by|your\s+host(?:\s+is)?|host|owner|property\s+manager)[ \t]*:?[ \t]*([A-Z][A-Za-z'-]+(?: [A-Z][A-Za-z'-]+)?)",
            )?,
        })
    }

    fn platform(&self, email: &RawEmail) -> Option<&'static str> {
        sender_domain(email)
            .and_then(|host| {
                PLATFORMS
                    .iter()
                    .find(|(_, domains, _)| domains.iter().any(|d| domain_matches(&host, d)))
                    .map(|(name, _, _)| *name)
            })
            .or_else(|| {
                let text = email.combined_text().to_ascii_lowercase();
                PLATFORMS
                    .iter()
                    .find(|(_, _, brand)| toolkit::contains_word(&text, brand))
                    .map(|(name, _, _)| *name)
            })
    }
}

/// Phone or email from the lines mentioning the host, owner or manager.
fn host_contact(body: &str) -> Option<String> {
    body.lines()
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            ["host", "owner", "manager", "contact"]
                .iter()
                .any(|k| lower.contains(k))
        })
        .find_map(|line| toolkit::find_phone_number(line).or_else(|| toolkit::find_email_address(line)))
}

#[async_trait]
impl Extractor for VacationRentalExtractor {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "Vacation Rentals"
    }

    fn priority(&self) -> i32 {
        85
    }

    fn can_parse(&self, email: &RawEmail) -> bool {
        self.detector.claims(email)
    }

    async fn parse(&self, email: &RawEmail) -> Result<BookingRecord, ExtractError> {
        let signals = self.detector.detect(email);
        let stay = Stay::read(email);
        let body = &email.body;
        let platform = self.platform(email);

        let property = toolkit::labeled_value(body, &["property:", "rental:", "listing:"])
            .or_else(|| toolkit::capture_first(&email.subject, std::slice::from_ref(&self.property)))
            .or_else(|| toolkit::capture_first(body, std::slice::from_ref(&self.property)))
            .and_then(|raw| clean_name(&raw));

        let mut record = BookingRecord::new(
            PROVIDER_ID,
            BookingType::Accommodation,
            property.clone().unwrap_or_else(|| {
                format!("{} rental", platform.unwrap_or("Vacation"))
            }),
            toolkit::email_date_or_today(email),
            email,
        );
        stay.apply(&mut record);
        record.status = toolkit::detect_status(email);
        record.confirmation_number = toolkit::find_code(body, &self.confirmation);
        record.location.name = property.clone();
        record.location.address = toolkit::labeled_value(body, &["address:", "property address"])
            .or_else(|| toolkit::find_street_address(body));

        let text = email.combined_text();
        record.details.platform = platform.map(ToString::to_string);
        record.details.property_name = property;
        record.details.property_type =
            toolkit::first_keyword(&text, PROPERTY_TYPES).map(ToString::to_string);
        record.details.host_name = self
            .host
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        record.details.host_contact = host_contact(body);
        record.details.nightly_rate = super::nightly_rate(body);
        record.details.cleaning_fee = toolkit::labeled_amount(body, &["cleaning fee", "cleaning"]);
        record.details.security_deposit = toolkit::labeled_amount(
            body,
            &["security deposit", "damage deposit", "refundable deposit"],
        );
        record.details.amenities = toolkit::scan_keywords(body, AMENITIES);

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
                record.details.property_type.is_some(),
                record.details.host_contact.is_some(),
                record.details.nightly_rate.is_some(),
            ],
        );
        record.set_confidence(confidence);
        Ok(record)
    }
}
