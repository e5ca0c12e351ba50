use async_trait::async_trait;
use regex::Regex;
use tripsync_core::{BookingRecord, BookingType, RawEmail};

use super::{apply_price, clean_name, confidence_for};
use crate::signals::{domain_matches, sender_domain, SignalDetector, SignalProfile};
use crate::toolkit;
use crate::{ExtractError, Extractor};

const PROVIDER_ID: &str = "restaurant";

/// Reservation platforms: display name, sender domains, brand keyword.
const PLATFORMS: &[(&str, &[&str], &str)] = &[
    ("OpenTable", &["opentable.com", "opentable.co.uk"], "opentable"),
    ("Resy", &["resy.com"], "resy"),
    ("Tock", &["exploretock.com", "tock.com"], "exploretock"),
    ("Yelp", &["yelp.com"], "yelp reservations"),
    ("SevenRooms", &["sevenrooms.com"], "sevenrooms"),
    ("TheFork", &["thefork.com", "lafourchette.com"], "thefork"),
    ("Bookatable", &["bookatable.com"], "bookatable"),
];

const RESTAURANT_SUBJECTS: &[&str] = &[
    r"reservation\s+(?:is\s+)?confirmed",
    r"your\s+(?:table|reservation)\s+(?:at|for)",
    r"booking\s+(?:is\s+)?confirmed",
    r"\btable\s+for\s+\d",
    r"see\s+you\s+(?:on|at|soon)",
    r"reservation\s+(?:reminder|update|cancel)",
];

const RESTAURANT_CUES: &[&str] = &[
    r"\bparty\s+(?:of|size)\b",
    r"\b(?:table|dining|restaurant)\b",
    r"\b\d{1,2}\s+(?:guests?|people|persons|diners)\b",
    r"\b\d{1,2}(?::\d{2})?\s*[ap]\.?m\b",
    r"\b(?:modify|change|cancel)\s+(?:your\s+)?reservation\b",
    r"\bmenu\b",
];

const CUISINES: &[(&str, &str)] = &[
    ("steakhouse", "steakhouse"),
    ("sushi", "japanese"),
    ("japanese", "japanese"),
    ("ramen", "japanese"),
    ("italian", "italian"),
    ("pizza", "italian"),
    ("trattoria", "italian"),
    ("mexican", "mexican"),
    ("taqueria", "mexican"),
    ("french", "french"),
    ("bistro", "french"),
    ("chinese", "chinese"),
    ("dim sum", "chinese"),
    ("thai", "thai"),
    ("indian", "indian"),
    ("korean", "korean"),
    ("vietnamese", "vietnamese"),
    ("mediterranean", "mediterranean"),
    ("greek", "greek"),
    ("spanish", "spanish"),
    ("tapas", "spanish"),
    ("seafood", "seafood"),
    ("oyster", "seafood"),
    ("barbecue", "bbq"),
    ("bbq", "bbq"),
    ("vegan", "vegetarian"),
    ("vegetarian", "vegetarian"),
];

const MEAL_WORDS: &[(&str, &str)] = &[
    ("brunch", "brunch"),
    ("breakfast", "breakfast"),
    ("lunch", "lunch"),
    ("dinner", "dinner"),
];

#[derive(Debug, Clone)]
pub struct RestaurantExtractor {
    detector: SignalDetector,
    venue: Regex,
    party: Vec<Regex>,
    confirmation: Vec<Regex>,
}

impl RestaurantExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let domains: Vec<&str> = PLATFORMS.iter().flat_map(|(_, d, _)| d.iter().copied()).collect();
        let brands: Vec<&str> = PLATFORMS.iter().map(|(_, _, b)| *b).collect();
        let detector = SignalDetector::new(SignalProfile {
            domains: &domains,
            subject_patterns: RESTAURANT_SUBJECTS,
            brands: &brands,
            cues: RESTAURANT_CUES,
            require_identity: true,
            ..SignalProfile::default()
        })?;
        Ok(Self {
            detector,
            venue: Regex::new(
                r"(?i:reservation\s+at|table\s+at|booking\s+at|dining\s+at|reserved\s+at|see\s+you\s+at)\s+(?:the\s+)?([^\n!|]+)",
            )?,
            party: vec![
                Regex::new(r"(?i:party\s+of|table\s+for|party\s+size:?)\s*(\d{1,2})\b")?,
                Regex::new(r"\b(\d{1,2})\s+(?i:guests?|people|persons|diners|covers)\b")?,
            ],
            confirmation: vec![Regex::new(
                r"(?i:confirmation|reservation)\s*(?i:number|#|code|id|no\.?)?\s*[:#]?\s*([A-Z0-9-]{5,14})\b",
            )?],
        })
    }

    fn platform(&self, email: &RawEmail) -> Option<&'static str> {
        let by_domain = sender_domain(email).and_then(|host| {
            PLATFORMS
                .iter()
                .find(|(_, domains, _)| domains.iter().any(|d| domain_matches(&host, d)))
                .map(|(name, _, _)| *name)
        });
        by_domain.or_else(|| {
            let text = email.combined_text().to_ascii_lowercase();
            PLATFORMS
                .iter()
                .find(|(_, _, brand)| toolkit::contains_word(&text, brand))
                .map(|(name, _, _)| *name)
        })
    }
}

/// Meal period from explicit wording, else from the reservation hour.
pub(crate) fn meal_period(text: &str, time: Option<&str>) -> Option<String> {
    if let Some(word) = toolkit::first_keyword(text, MEAL_WORDS) {
        return Some(word.to_string());
    }
    let hour: u32 = time?.split(':').next()?.parse().ok()?;
    let period = match hour {
        5..=10 => "breakfast",
        11..=15 => "lunch",
        _ => "dinner",
    };
    Some(period.to_string())
}

#[async_trait]
impl Extractor for RestaurantExtractor {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "Restaurant Reservations"
    }

    fn priority(&self) -> i32 {
        85
    }

    fn can_parse(&self, email: &RawEmail) -> bool {
        self.detector.claims(email)
    }

    async fn parse(&self, email: &RawEmail) -> Result<BookingRecord, ExtractError> {
        let signals = self.detector.detect(email);
        let year = email.sent_year();
        let body = &email.body;
        let platform = self.platform(email);

        let venue = toolkit::labeled_value(body, &["restaurant:", "venue:"])
            .or_else(|| toolkit::capture_first(&email.subject, std::slice::from_ref(&self.venue)))
            .or_else(|| toolkit::capture_first(body, std::slice::from_ref(&self.venue)))
            .and_then(|raw| clean_name(&raw));

        let date = toolkit::labeled_date(body, &["date:", "when:"], year)
            .or_else(|| toolkit::first_date(body, year))
            .or_else(|| toolkit::first_date(&email.subject, year));
        let time = toolkit::labeled_time(body, &["time:", "when:"])
            .or_else(|| toolkit::parse_time(body))
            .or_else(|| toolkit::parse_time(&email.subject));

        let mut record = BookingRecord::new(
            PROVIDER_ID,
            BookingType::Restaurant,
            venue.clone().unwrap_or_else(|| {
                format!("{} reservation", platform.unwrap_or("Restaurant"))
            }),
            date.unwrap_or_else(|| toolkit::email_date_or_today(email)),
            email,
        );
        record.status = toolkit::detect_status(email);
        record.confirmation_number = toolkit::find_code(body, &self.confirmation);
        record.start_time = time.clone();
        record.location.name = venue.clone();
        record.location.address = toolkit::labeled_value(body, &["address:", "location:"])
            .or_else(|| toolkit::find_street_address(body));
        apply_price(&mut record, toolkit::parse_price(body));

        let text = email.combined_text();
        record.details.platform = platform.map(ToString::to_string);
        record.details.party_size = toolkit::capture_u32(&text, &self.party).filter(|p| *p > 0);
        record.details.meal_period = meal_period(&text, time.as_deref());
        record.details.cuisine = toolkit::first_keyword(&text, CUISINES).map(ToString::to_string);
        if let Some(phone) = toolkit::find_phone_number(body) {
            record.details.insert_extra("restaurant_phone", phone);
        }

        let confidence = confidence_for(
            &signals,
            &[venue.is_some(), date.is_some(), time.is_some()],
            &[
                record.details.party_size.is_some(),
                record.confirmation_number.is_some(),
                record.location.address.is_some(),
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
    async fn parses_opentable_reservation() {
        let extractor = RestaurantExtractor::new().unwrap();
        let email = RawEmail::new(
            "msg-ot-1",
            "OpenTable <member_services@opentable.com>",
            "Your reservation at Nopa is confirmed",
            "Tue, 02 Jul 2024 15:00:00 -0700",
            "You're all set!\n\
             Nopa\n\
             Date: Saturday, July 13, 2024\n\
             Time: 7:30 PM\n\
             Party of 4\n\
             Confirmation #: 1029384\n\
             560 Divisadero Street, San Francisco, CA\n\
             (415) 864-8643\n\
             Need to modify your reservation? Visit the restaurant page.",
        );
        assert!(extractor.can_parse(&email));
        let record = extractor.parse(&email).await.unwrap();

        assert_eq!(record.booking_type, BookingType::Restaurant);
        assert_eq!(record.title, "Nopa");
        assert_eq!(record.start_date.to_string(), "2024-07-13");
        assert_eq!(record.start_time.as_deref(), Some("19:30"));
        assert_eq!(record.details.party_size, Some(4));
        assert_eq!(record.details.meal_period.as_deref(), Some("dinner"));
        assert_eq!(record.details.platform.as_deref(), Some("OpenTable"));
        assert_eq!(record.confirmation_number.as_deref(), Some("1029384"));
        assert_eq!(
            record.location.address.as_deref(),
            Some("560 Divisadero Street, San Francisco, CA")
        );
        assert!(record.confidence() > 0.7);
    }

    #[test]
    fn hotel_confirmation_without_platform_is_not_claimed() {
        let extractor = RestaurantExtractor::new().unwrap();
        let email = RawEmail::new(
            "m",
            "stay@smallinn.example",
            "Reservation confirmed",
            "",
            "Check-in 3 PM. 2 guests. Dining room open until 10 pm. Cancel reservation anytime.",
        );
        assert!(!extractor.can_parse(&email));
    }

    #[test]
    fn meal_period_prefers_explicit_wording() {
        assert_eq!(meal_period("Sunday brunch for 2", Some("11:30")).as_deref(), Some("brunch"));
        assert_eq!(meal_period("Table for 2", Some("12:15")).as_deref(), Some("lunch"));
        assert_eq!(meal_period("Table for 2", Some("20:00")).as_deref(), Some("dinner"));
        assert_eq!(meal_period("Table for 2", None), None);
    }

    #[test]
    fn supports_at_least_six_platforms() {
        assert!(PLATFORMS.len() >= 6);
    }

    #[test]
    fn cuisine_ignores_words_containing_the_keyword() {
        assert_eq!(
            toolkit::first_keyword("Flavors of Thailand, Indiana edition", CUISINES),
            None
        );
        assert_eq!(
            toolkit::first_keyword("Best Thai in town", CUISINES),
            Some("thai")
        );
    }
}
