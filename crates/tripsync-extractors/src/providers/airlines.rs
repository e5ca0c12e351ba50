//! Airline itineraries across the major carriers, one record per itinerary.
//!
//! Every flight segment found lands in `details.all_flights`; the first one
//! is the primary segment and drives the record's dates, times and title.

use async_trait::async_trait;
use regex::Regex;
use tripsync_core::{BookingRecord, BookingType, FlightLeg, RawEmail, SignalKind};

use super::{apply_price, confidence_for};
use crate::signals::{domain_matches, sender_domain, SignalDetector, SignalProfile};
use crate::toolkit;
use crate::{ExtractError, Extractor};

const PROVIDER_ID: &str = "airline";

#[derive(Debug, Clone, Copy)]
struct Carrier {
    code: &'static str,
    name: &'static str,
    domains: &'static [&'static str],
}

const CARRIERS: &[Carrier] = &[
    Carrier { code: "UA", name: "United Airlines", domains: &["united.com", "unitedairlines.com"] },
    Carrier { code: "DL", name: "Delta Air Lines", domains: &["delta.com"] },
    Carrier { code: "AA", name: "American Airlines", domains: &["aa.com", "americanairlines.com"] },
    Carrier { code: "WN", name: "Southwest Airlines", domains: &["southwest.com", "luv.southwest.com"] },
    Carrier { code: "B6", name: "JetBlue", domains: &["jetblue.com"] },
    Carrier { code: "AS", name: "Alaska Airlines", domains: &["alaskaair.com"] },
    Carrier { code: "NK", name: "Spirit Airlines", domains: &["spirit.com", "fly.spirit-airlines.com"] },
    Carrier { code: "F9", name: "Frontier Airlines", domains: &["flyfrontier.com"] },
    Carrier { code: "HA", name: "Hawaiian Airlines", domains: &["hawaiianairlines.com"] },
    Carrier { code: "AC", name: "Air Canada", domains: &["aircanada.ca", "aircanada.com"] },
    Carrier { code: "BA", name: "British Airways", domains: &["ba.com", "britishairways.com"] },
    Carrier { code: "LH", name: "Lufthansa", domains: &["lufthansa.com"] },
    Carrier { code: "AF", name: "Air France", domains: &["airfrance.com", "airfrance.fr"] },
    Carrier { code: "KL", name: "KLM", domains: &["klm.com"] },
    Carrier { code: "EK", name: "Emirates", domains: &["emirates.com"] },
    Carrier { code: "QR", name: "Qatar Airways", domains: &["qatarairways.com"] },
];

const AIRLINE_SUBJECTS: &[&str] = &[
    r"\bflight\b",
    r"\bitinerary\b",
    r"e-?ticket",
    r"\btrip\s+(?:confirmation|receipt|details)",
    r"boarding\s+pass",
    r"\bcheck[\s-]?in\s+(?:now|is\s+open|for\s+your)",
    r"travel\s+(?:confirmation|receipt)",
];

const AIRLINE_CUES: &[&str] = &[
    r"\b(?:flight|flt)\b",
    r"\bdepart(?:s|ure|ing)?\b",
    r"\barriv(?:e|es|al|ing)\b",
    r"\bseats?\b",
    r"\b(?:boarding|gate|terminal)\b",
    r"\b[A-Z]{3}\s*(?:→|->|–)\s*[A-Z]{3}\b",
    r"\b(?:economy|business|first\s+class|premium|main\s+cabin)\b",
];

const CABINS: &[(&str, &str)] = &[
    ("premium economy", "Premium Economy"),
    ("basic economy", "Basic Economy"),
    ("main cabin", "Main Cabin"),
    ("economy", "Economy"),
    ("business", "Business"),
    ("first class", "First"),
];

#[derive(Debug, Clone)]
pub struct AirlineExtractor {
    detector: SignalDetector,
    flight_number: Regex,
    labeled_flight: Regex,
    route: Regex,
    seat: Regex,
    confirmation: Regex,
    passenger: Regex,
}

impl AirlineExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let domains: Vec<&str> = CARRIERS.iter().flat_map(|c| c.domains.iter().copied()).collect();
        let brands: Vec<String> = CARRIERS.iter().map(|c| c.name.to_ascii_lowercase()).collect();
        let brands: Vec<&str> = brands.iter().map(String::as_str).collect();
        let codes: Vec<&str> = CARRIERS.iter().map(|c| c.code).collect();

        let detector = SignalDetector::new(SignalProfile {
            domains: &domains,
            domain_pattern: Some(r"@(?:[\w-]+\.)*[\w-]*(?:airlines?|airways|air)[\w-]*\.[a-z.]+$"),
            subject_patterns: AIRLINE_SUBJECTS,
            brands: &brands,
            cues: AIRLINE_CUES,
            require_identity: true,
            ..SignalProfile::default()
        })?;

        Ok(Self {
            detector,
            flight_number: Regex::new(&format!(r"\b({})\s?(\d{{1,4}})\b", codes.join("|")))?,
            labeled_flight: Regex::new(
                r"(?i:flight|flt)\.?\s*(?i:number|no\.?|#)?\s*:?\s*([A-Z][A-Z0-9]|[0-9][A-Z])\s?(\d{1,4})\b",
            )?,
            route: Regex::new(r"\b([A-Z]{3})\s*(?:→|->|–|—|-|to)\s*([A-Z]{3})\b")?,
            seat: Regex::new(r"(?i:seats?)\s*:?\s*(\d{1,2}[A-K])\b")?,
            confirmation: Regex::new(
                r"(?i:confirmation|record\s+locator|booking\s+reference|reservation\s+code|pnr)\s*(?i:code|number|#|no\.?)?\s*[:#]?\s*([A-Z0-9]{6})\b",
            )?,
            passenger: Regex::new(
                r"(?i:passenger|traveler|traveller)s?(?i:\s+name)?\s*:[ \t]*([A-Z][A-Za-z'/-]+(?: [A-Z][A-Za-z'/-]+)*)",
            )?,
        })
    }

    fn carrier_for_sender(email: &RawEmail) -> Option<&'static Carrier> {
        let host = sender_domain(email)?;
        CARRIERS
            .iter()
            .find(|c| c.domains.iter().any(|d| domain_matches(&host, d)))
    }

    fn carrier_for_code(code: &str) -> Option<&'static Carrier> {
        CARRIERS.iter().find(|c| c.code == code)
    }

    /// Flight segments in document order, one window per flight number.
    fn legs(&self, body: &str, year: i32) -> Vec<FlightLeg> {
        let mut hits: Vec<(usize, usize, String, String)> = self
            .flight_number
            .captures_iter(body)
            .filter_map(|c| {
                let whole = c.get(0)?;
                Some((
                    whole.start(),
                    whole.end(),
                    c.get(1)?.as_str().to_string(),
                    c.get(2)?.as_str().to_string(),
                ))
            })
            .collect();
        for c in self.labeled_flight.captures_iter(body) {
            let (Some(whole), Some(code), Some(num)) = (c.get(0), c.get(1), c.get(2)) else {
                continue;
            };
            let overlaps = hits
                .iter()
                .any(|(start, end, _, _)| whole.start() < *end && whole.end() > *start);
            if !overlaps {
                hits.push((code.start(), whole.end(), code.as_str().to_string(), num.as_str().to_string()));
            }
        }
        hits.sort_by_key(|(start, _, _, _)| *start);

        let mut legs: Vec<FlightLeg> = Vec::new();
        for (idx, (start, _, code, number)) in hits.iter().enumerate() {
            let end = hits.get(idx + 1).map(|h| h.0).unwrap_or(body.len());
            let window = &body[*start..end];

            let route = self.route.captures(window);
            let times = toolkit::find_times(window);
            let departure_time = toolkit::labeled_time(window, &["depart"])
                .or_else(|| times.first().map(|(_, t)| t.clone()));
            let arrival_time = toolkit::labeled_time(window, &["arriv"])
                .or_else(|| times.get(1).map(|(_, t)| t.clone()));

            let leg = FlightLeg {
                flight_number: format!("{code}{number}"),
                airline: Self::carrier_for_code(code).map(|c| c.name.to_string()),
                departure_airport: route.as_ref().and_then(|r| r.get(1)).map(|m| m.as_str().to_string()),
                arrival_airport: route.as_ref().and_then(|r| r.get(2)).map(|m| m.as_str().to_string()),
                departure_date: toolkit::labeled_date(window, &["depart", "date"], year)
                    .or_else(|| toolkit::first_date(window, year)),
                departure_time,
                arrival_time,
                seat: toolkit::capture_first(window, std::slice::from_ref(&self.seat)),
                cabin_class: toolkit::first_keyword(window, CABINS).map(ToString::to_string),
            };

            let duplicate = legs.iter().any(|l| {
                l.flight_number == leg.flight_number && l.departure_date == leg.departure_date
            });
            if !duplicate {
                legs.push(leg);
            }
        }
        legs
    }
}

#[async_trait]
impl Extractor for AirlineExtractor {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "Airlines"
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
        let legs = self.legs(&email.body, year);
        let primary = legs
            .first()
            .cloned()
            .ok_or_else(|| ExtractError::missing("flight number"))?;

        let carrier = Self::carrier_for_sender(email)
            .or_else(|| primary.flight_number.get(..2).and_then(Self::carrier_for_code))
            .map(|c| c.name.to_string())
            .or_else(|| signals.first_value(SignalKind::Content).map(ToString::to_string));

        let title = match (&primary.departure_airport, &primary.arrival_airport) {
            (Some(from), Some(to)) => format!("{} {from} → {to}", primary.flight_number),
            _ => format!("Flight {}", primary.flight_number),
        };

        let start_date = primary
            .departure_date
            .or_else(|| toolkit::first_date(&email.body, year))
            .unwrap_or_else(|| toolkit::email_date_or_today(email));

        let mut record = BookingRecord::new(PROVIDER_ID, BookingType::Flight, title, start_date, email);
        record.status = toolkit::detect_status(email);
        record.confirmation_number = toolkit::capture_first(&email.body, std::slice::from_ref(&self.confirmation))
            .or_else(|| toolkit::capture_first(&email.subject, std::slice::from_ref(&self.confirmation)));
        record.end_date = legs
            .last()
            .filter(|_| legs.len() > 1)
            .and_then(|l| l.departure_date)
            .filter(|d| *d > start_date);
        record.start_time = primary.departure_time.clone();
        record.end_time = primary.arrival_time.clone();
        record.location.name = primary.arrival_airport.clone();
        apply_price(&mut record, toolkit::parse_price(&email.body));

        record.details.airline = carrier;
        if let Some(passenger) =
            toolkit::capture_first(&email.body, std::slice::from_ref(&self.passenger))
        {
            record.details.insert_extra("passenger", passenger);
        }
        record.details.all_flights = legs;

        let confidence = confidence_for(
            &signals,
            &[
                record.confirmation_number.is_some(),
                primary.departure_date.is_some(),
                primary.departure_airport.is_some() && primary.arrival_airport.is_some(),
            ],
            &[
                record.start_time.is_some(),
                record.end_time.is_some(),
                record.total_price.is_some(),
                primary.seat.is_some(),
            ],
        );
        record.set_confidence(confidence);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn round_trip_email() -> RawEmail {
        RawEmail::new(
            "msg-ua-1",
            "United Airlines <unitedairlines@united.com>",
            "Your trip confirmation - SFO to JFK",
            "Mon, 01 Apr 2024 10:00:00 -0700",
            "Confirmation number: KX7Q2M\n\
             Traveler: Jordan Lee\n\
             Flight 1 of 2\n\
             UA 256  SFO → JFK\n\
             Departs: Fri, May 10, 2024 8:00 AM\n\
             Arrives: Fri, May 10, 2024 4:35 PM\n\
             Seat: 23A  Economy\n\
             Flight 2 of 2\n\
             UA 789  JFK → SFO\n\
             Departs: Fri, May 17, 2024 6:00 PM\n\
             Arrives: Fri, May 17, 2024 9:30 PM\n\
             Seat: 24C  Economy\n\
             Total: $612.80 USD",
        )
    }

    #[tokio::test]
    async fn two_leg_itinerary_keeps_outbound_as_primary() {
        let extractor = AirlineExtractor::new().unwrap();
        let email = round_trip_email();
        assert!(extractor.can_parse(&email));

        let record = extractor.parse(&email).await.unwrap();
        assert_eq!(record.booking_type, BookingType::Flight);
        assert_eq!(record.title, "UA256 SFO → JFK");
        assert_eq!(record.details.airline.as_deref(), Some("United Airlines"));
        assert_eq!(record.confirmation_number.as_deref(), Some("KX7Q2M"));
        assert_eq!(record.start_date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert_eq!(record.end_date, NaiveDate::from_ymd_opt(2024, 5, 17));
        assert_eq!(record.start_time.as_deref(), Some("08:00"));
        assert_eq!(record.end_time.as_deref(), Some("16:35"));
        assert_eq!(record.location.name.as_deref(), Some("JFK"));
        assert_eq!(record.total_price, Some(612.8));

        let legs = &record.details.all_flights;
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].flight_number, "UA256");
        assert_eq!(legs[0].seat.as_deref(), Some("23A"));
        assert_eq!(legs[0].cabin_class.as_deref(), Some("Economy"));
        assert_eq!(legs[1].flight_number, "UA789");
        assert_eq!(legs[1].departure_airport.as_deref(), Some("JFK"));
        assert_eq!(legs[1].arrival_time.as_deref(), Some("21:30"));
        assert_eq!(
            record.details.extras.get("passenger"),
            Some(&serde_json::json!("Jordan Lee"))
        );
    }

    #[tokio::test]
    async fn email_without_flight_numbers_fails_to_parse() {
        let extractor = AirlineExtractor::new().unwrap();
        let email = RawEmail::new(
            "m",
            "news@delta.com",
            "Your flight credit is waiting",
            "",
            "Use your credit before it expires. Depart anywhere, arrive happy.",
        );
        assert!(extractor.parse(&email).await.is_err());
    }

    #[test]
    fn labeled_flight_numbers_cover_unknown_carriers() {
        let extractor = AirlineExtractor::new().unwrap();
        let legs = extractor.legs("Flight: TP 1234 LIS → OPO on June 2, 2024 at 10:15", 2024);
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].flight_number, "TP1234");
        assert_eq!(legs[0].departure_airport.as_deref(), Some("LIS"));
        assert_eq!(legs[0].departure_date, NaiveDate::from_ymd_opt(2024, 6, 2));
        assert_eq!(legs[0].departure_time.as_deref(), Some("10:15"));
        assert!(legs[0].airline.is_none());
    }

    #[test]
    fn covers_at_least_fifteen_carrier_domains() {
        let domains: usize = CARRIERS.iter().map(|c| c.domains.len()).sum();
        assert!(domains >= 15);
    }
}
