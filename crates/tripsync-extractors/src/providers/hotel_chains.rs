//! Major hotel groups, one brand family per loyalty programme.

use async_trait::async_trait;
use regex::Regex;
use tripsync_core::{
    BookingRecord, BookingType, DetectionSignal, DetectionSignalSet, RawEmail, SignalKind,
};

use super::{clean_name, confidence_for, Stay};
use crate::signals::{SignalDetector, SignalProfile, LODGING_CUES};
use crate::toolkit;
use crate::{ExtractError, Extractor};

const PROVIDER_ID: &str = "hotel_chain";

const HOTEL_DOMAIN_PATTERN: &str = r"@(?:[\w-]+\.)*[\w-]*(?:hotel|hotels|resort|resorts|inn|suites)[\w-]*\.[a-z.]+$";

const HOTEL_SUBJECTS: &[&str] = &[
    r"reservation\s+(?:is\s+)?confirm",
    r"booking\s+(?:is\s+)?confirm",
    r"your\s+(?:upcoming\s+)?(?:stay|reservation)\b",
    r"confirmation\s+(?:for|number|#)",
    r"reservation\s+(?:cancel|modif|change)",
    r"thank\s+you\s+for\s+(?:booking|choosing)",
];

const GENERIC_CONFIRMATION: &str =
    r"(?i:confirmation|reservation|itinerary)\s*(?i:number|#|no\.?|code)?\s*[:#]?\s*([A-Z0-9]{6,12})\b";

const GENERIC_LOYALTY: &str =
    r"(?i:member(?:ship)?|rewards|loyalty)\s*(?i:number|#|no\.?|id)\s*[:#]?\s*([A-Z0-9]{6,16})\b";

#[derive(Debug, Clone, Copy)]
struct BrandFamily {
    name: &'static str,
    domains: &'static [&'static str],
    brands: &'static [&'static str],
    confirmation: &'static str,
    loyalty: Option<&'static str>,
}

const FAMILIES: &[BrandFamily] = &[
    BrandFamily {
        name: "Marriott",
        domains: &["marriott.com", "marriott-email.com", "ritzcarlton.com"],
        brands: &[
            "marriott", "bonvoy", "sheraton", "westin", "ritz-carlton", "courtyard",
            "residence inn", "fairfield inn", "st. regis", "le meridien", "aloft",
            "springhill suites", "w hotels",
        ],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*(\d{8,10})\b",
        loyalty: Some(r"(?i:bonvoy)\s*(?i:member|number|#|account)*\s*[:#]?\s*(\d{9})\b"),
    },
    BrandFamily {
        name: "Hilton",
        domains: &["hilton.com", "hiltonhonors.com", "h1.hilton.com"],
        brands: &[
            "hilton", "doubletree", "hampton inn", "embassy suites", "waldorf astoria",
            "conrad", "homewood suites", "home2 suites", "curio collection", "tru by hilton",
            "canopy by hilton",
        ],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*(\d{8,10})\b",
        loyalty: Some(r"(?i:honors)\s*(?i:number|#|account)*\s*[:#]?\s*(\d{9,10})\b"),
    },
    BrandFamily {
        name: "IHG",
        domains: &["ihg.com", "mc.ihg.com", "ihgrewardsclub.com"],
        brands: &[
            "ihg", "holiday inn", "crowne plaza", "intercontinental", "kimpton",
            "hotel indigo", "staybridge suites", "candlewood suites", "even hotels",
        ],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*(\d{8})\b",
        loyalty: Some(r"(?i:one\s+rewards|rewards\s+club)\s*(?i:number|#|member)*\s*[:#]?\s*(\d{9})\b"),
    },
    BrandFamily {
        name: "Hyatt",
        domains: &["hyatt.com", "t.hyatt.com"],
        brands: &[
            "hyatt", "andaz", "park hyatt", "grand hyatt", "hyatt regency", "hyatt place",
            "hyatt house", "thompson hotels", "alila",
        ],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*([A-Z0-9]{8})\b",
        loyalty: Some(r"(?i:world\s+of\s+hyatt)\s*(?i:number|#|member)*\s*[:#]?\s*(\d{9}[A-Z]?)\b"),
    },
    BrandFamily {
        name: "Accor",
        domains: &["accor.com", "all.accor.com", "accorhotels.com"],
        brands: &[
            "accor", "sofitel", "novotel", "ibis", "pullman", "mercure", "fairmont",
            "raffles", "swissotel", "mgallery",
        ],
        confirmation: r"(?i:booking\s+(?:number|reference)|confirmation\s*(?:number|#)?)\s*[:#]?\s*([A-Z0-9]{6,12})\b",
        loyalty: None,
    },
    BrandFamily {
        name: "Wyndham",
        domains: &["wyndhamhotels.com", "wyndham.com", "email.wyndhamhotels.com"],
        brands: &[
            "wyndham", "ramada", "days inn", "super 8", "la quinta", "howard johnson",
            "microtel", "baymont", "travelodge",
        ],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*(\d{8,10})\b",
        loyalty: None,
    },
    BrandFamily {
        name: "Choice Hotels",
        domains: &["choicehotels.com", "email.choicehotels.com"],
        brands: &[
            "choice hotels", "comfort inn", "comfort suites", "quality inn", "clarion",
            "econo lodge", "cambria", "sleep inn", "mainstay suites", "rodeway inn",
        ],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*(\d{8,10})\b",
        loyalty: None,
    },
    BrandFamily {
        name: "Best Western",
        domains: &["bestwestern.com", "email.bestwestern.com"],
        brands: &["best western", "surestay", "sadie", "aiden"],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*(\d{9})\b",
        loyalty: None,
    },
    BrandFamily {
        name: "Radisson",
        domains: &["radissonhotels.com", "radisson.com", "radissonhotelsamericas.com"],
        brands: &["radisson", "park plaza", "park inn", "country inn & suites"],
        confirmation: r"(?i:confirmation)\s*(?i:number|#|no\.?)?\s*[:#]?\s*(\d{8,9})\b",
        loyalty: None,
    },
];

#[derive(Debug, Clone)]
struct FamilyMatcher {
    family: BrandFamily,
    detector: SignalDetector,
    confirmation: Vec<Regex>,
    loyalty: Vec<Regex>,
}

#[derive(Debug, Clone)]
pub struct HotelChainExtractor {
    families: Vec<FamilyMatcher>,
    hotel_name: Regex,
}

impl HotelChainExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let generic_confirmation = Regex::new(GENERIC_CONFIRMATION)?;
        let generic_loyalty = Regex::new(GENERIC_LOYALTY)?;
        let families = FAMILIES
            .iter()
            .map(|family| -> Result<FamilyMatcher, ExtractError> {
                let detector = SignalDetector::new(SignalProfile {
                    domains: family.domains,
                    domain_pattern: Some(HOTEL_DOMAIN_PATTERN),
                    subject_patterns: HOTEL_SUBJECTS,
                    brands: family.brands,
                    cues: LODGING_CUES,
                    require_identity: true,
                    ..SignalProfile::default()
                })?;
                let mut loyalty = Vec::new();
                if let Some(pattern) = family.loyalty {
                    loyalty.push(Regex::new(pattern)?);
                }
                loyalty.push(generic_loyalty.clone());
                Ok(FamilyMatcher {
                    family: *family,
                    detector,
                    confirmation: vec![Regex::new(family.confirmation)?, generic_confirmation.clone()],
                    loyalty,
                })
            })
            .collect::<Result<Vec<_>, ExtractError>>()?;

        Ok(Self {
            families,
            hotel_name: Regex::new(
                r"(?i:stay\s+at|reservation\s+at|booking\s+at|welcome\s+to|confirmation\s+for|confirmed\s+at|see\s+you\s+at)\s+(?:the\s+)?([^\n!|]+)",
            )?,
        })
    }

    /// Best-scoring family that claims the email, with its signals. Ties go to
    /// the family listed first.
    fn identify(&self, email: &RawEmail) -> Option<(&FamilyMatcher, DetectionSignalSet)> {
        self.families
            .iter()
            .map(|m| (m, m.detector.detect(email)))
            .filter(|(m, signals)| m.detector.is_claimed(signals))
            .min_by(|(_, a), (_, b)| {
                b.strong_count()
                    .cmp(&a.strong_count())
                    .then(b.mean_strong_confidence().total_cmp(&a.mean_strong_confidence()))
            })
    }

    fn hotel_name(&self, email: &RawEmail, family: &BrandFamily) -> Option<String> {
        toolkit::labeled_value(&email.body, &["hotel:", "property:", "hotel name"])
            .or_else(|| toolkit::capture_first(&email.subject, std::slice::from_ref(&self.hotel_name)))
            .or_else(|| toolkit::capture_first(&email.body, std::slice::from_ref(&self.hotel_name)))
            .and_then(|raw| clean_name(&raw))
            .or_else(|| {
                email
                    .body
                    .lines()
                    .map(str::trim)
                    .find(|line| {
                        let lower = line.to_ascii_lowercase();
                        line.len() <= 80
                            && family.brands.iter().any(|b| {
                                lower
                                    .strip_prefix(b)
                                    .is_some_and(|rest| !rest.starts_with(char::is_alphanumeric))
                            })
                    })
                    .map(ToString::to_string)
            })
    }
}

#[async_trait]
impl Extractor for HotelChainExtractor {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "Hotel Chains"
    }

    fn priority(&self) -> i32 {
        85
    }

    fn can_parse(&self, email: &RawEmail) -> bool {
        self.identify(email).is_some()
    }

    async fn parse(&self, email: &RawEmail) -> Result<BookingRecord, ExtractError> {
        let (matcher, mut signals) = self
            .identify(email)
            .ok_or_else(|| ExtractError::Message("no hotel brand family matched".into()))?;
        let family = &matcher.family;
        signals.insert(
            SignalKind::Brand,
            DetectionSignal::hit("brand_family", 1.0, Some(family.name.to_string())),
        );

        let stay = Stay::read(email);
        let hotel = self.hotel_name(email, family);

        let mut record = BookingRecord::new(
            PROVIDER_ID,
            BookingType::Accommodation,
            hotel.clone().unwrap_or_else(|| format!("{} stay", family.name)),
            toolkit::email_date_or_today(email),
            email,
        );
        stay.apply(&mut record);
        record.status = toolkit::detect_status(email);
        record.confirmation_number = toolkit::capture_first(&email.body, &matcher.confirmation)
            .or_else(|| toolkit::capture_first(&email.subject, &matcher.confirmation))
            .filter(|c| c.chars().any(|ch| ch.is_ascii_digit()));

        record.location.name = hotel.clone();
        record.location.address = toolkit::labeled_value(&email.body, &["address:", "hotel address"])
            .or_else(|| toolkit::find_street_address(&email.body));

        record.details.brand = Some(family.name.to_string());
        record.details.property_name = hotel;
        record.details.room_type =
            toolkit::labeled_value(&email.body, &["room type", "room description", "room:"]);
        record.details.nightly_rate = super::nightly_rate(&email.body);
        record.details.loyalty_number = toolkit::capture_first(&email.body, &matcher.loyalty);

        let confidence = confidence_for(
            &signals,
            &[
                record.confirmation_number.is_some(),
                stay.check_in.is_some(),
                stay.check_out.is_some(),
            ],
            &[
                record.total_price.is_some(),
                record.details.property_name.is_some(),
                record.location.address.is_some(),
                record.details.room_type.is_some(),
            ],
        );
        record.set_confidence(confidence);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hilton_email() -> RawEmail {
        RawEmail::new(
            "msg-hilton-1",
            "Hilton Honors <reservations@h1.hilton.com>",
            "Your reservation is confirmed at Hilton Garden Inn Austin Downtown",
            "Thu, 01 Feb 2024 08:00:00 -0600",
            "Confirmation Number: 3141592653\n\
             Honors Number: 123456789\n\
             Arrival: Thursday, February 22, 2024\n\
             Departure: Sunday, February 25, 2024\n\
             Check-in time: 3:00 PM\n\
             Room type: King Room with Sofa Bed\n\
             1 adult\n\
             Address: 500 North Interstate 35, Austin, TX\n\
             Total for stay: $687.45",
        )
    }

    #[tokio::test]
    async fn parses_hilton_stay() {
        let extractor = HotelChainExtractor::new().unwrap();
        let email = hilton_email();
        assert!(extractor.can_parse(&email));

        let record = extractor.parse(&email).await.unwrap();
        assert_eq!(record.details.brand.as_deref(), Some("Hilton"));
        assert_eq!(record.title, "Hilton Garden Inn Austin Downtown");
        assert_eq!(record.confirmation_number.as_deref(), Some("3141592653"));
        assert_eq!(record.details.loyalty_number.as_deref(), Some("123456789"));
        assert_eq!(record.start_date.to_string(), "2024-02-22");
        assert_eq!(record.end_date.map(|d| d.to_string()).as_deref(), Some("2024-02-25"));
        assert_eq!(record.start_time.as_deref(), Some("15:00"));
        assert_eq!(record.details.room_type.as_deref(), Some("King Room with Sofa Bed"));
        assert_eq!(record.total_price, Some(687.45));
        assert!(record.confidence() > 0.7);
    }

    #[test]
    fn identifies_family_from_brand_keyword() {
        let extractor = HotelChainExtractor::new().unwrap();
        let email = RawEmail::new(
            "m",
            "stays@reservations-hotels.example",
            "Your stay at Sheraton Grand is confirmed",
            "",
            "Check-in March 3\nCheck-out March 5\n2 guests",
        );
        let (matcher, _) = extractor.identify(&email).unwrap();
        assert_eq!(matcher.family.name, "Marriott");
    }

    #[test]
    fn generic_hotel_mail_without_brand_is_not_claimed() {
        let extractor = HotelChainExtractor::new().unwrap();
        let email = RawEmail::new(
            "m",
            "hello@familyrun.example",
            "Reservation confirmed",
            "",
            "Check-in March 3\nCheck-out March 5\n2 guests\nYour room is ready",
        );
        assert!(!extractor.can_parse(&email));
    }

    #[test]
    fn covers_at_least_eight_brand_families() {
        assert!(FAMILIES.len() >= 8);
    }

    #[test]
    fn brand_keywords_match_whole_words_only() {
        let extractor = HotelChainExtractor::new().unwrap();
        let email = RawEmail::new(
            "m",
            "desk@smallinn.example",
            "Reservation confirmed",
            "",
            "According to our policy, late arrivals must call ahead.\n\
             Confirmation: AB12345\n\
             Check-in March 3\nCheck-out March 5\n2 guests",
        );
        assert!(!extractor.can_parse(&email));
    }
}
