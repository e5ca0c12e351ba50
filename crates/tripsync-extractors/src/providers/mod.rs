//! Provider extractors and the field readers they share.

mod airbnb;
mod airlines;
mod booking;
mod hotel_chains;
mod restaurants;
mod vacation_rentals;

pub use airbnb::AirbnbExtractor;
pub use airlines::AirlineExtractor;
pub use booking::BookingComExtractor;
pub use hotel_chains::HotelChainExtractor;
pub use restaurants::RestaurantExtractor;
pub use vacation_rentals::VacationRentalExtractor;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tripsync_core::{BookingRecord, DetectionSignalSet, RawEmail};

use crate::toolkit::{self, Money};

pub(crate) const CHECK_IN_LABELS: &[&str] = &["check-in", "check in", "checkin", "arrival"];
pub(crate) const CHECK_OUT_LABELS: &[&str] =
    &["check-out", "check out", "checkout", "departure"];

pub(crate) const PROPERTY_TYPES: &[(&str, &str)] = &[
    ("townhome", "townhouse"),
    ("townhouse", "townhouse"),
    ("bungalow", "bungalow"),
    ("cottage", "cottage"),
    ("chalet", "chalet"),
    ("cabin", "cabin"),
    ("villa", "villa"),
    ("condo", "condo"),
    ("apartment", "apartment"),
    ("loft", "loft"),
    ("studio", "studio"),
    ("guesthouse", "guesthouse"),
    ("house", "house"),
    ("home", "house"),
    ("room", "room"),
];

static GUESTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(?:guests?|adults?|people|persons|travell?ers)\b")
        .expect("guest count pattern")
});

static GUESTS_LABELED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:guests?|number of guests)\s*:\s*(\d{1,2})\b").expect("guest label pattern")
});

static NIGHTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,3})\s+nights?\b").expect("night count pattern"));

static RATE_TIMES_NIGHTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[$€£]\s*(\d[\d,]*(?:\.\d{1,2})?)\s*(?:x|×)\s*\d+\s+nights?")
        .expect("rate times nights pattern")
});

static RATE_PER_NIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[$€£]\s*(\d[\d,]*(?:\.\d{1,2})?)\s*(?:/|per|a)\s*night")
        .expect("rate per night pattern")
});

static TRAILING_CITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bin\s+([A-Z][A-Za-z .'-]*[A-Za-z])\s*$").expect("trailing city pattern")
});

/// Dates, times, counts and price of a lodging stay.
#[derive(Debug, Clone, Default)]
pub(crate) struct Stay {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub check_in_time: Option<String>,
    pub check_out_time: Option<String>,
    pub guests: Option<u32>,
    pub nights: Option<u32>,
    pub price: Option<Money>,
}

impl Stay {
    pub fn read(email: &RawEmail) -> Self {
        let year = email.sent_year();
        let body = &email.body;
        let check_in = toolkit::labeled_date(body, CHECK_IN_LABELS, year);
        let check_out = toolkit::labeled_date(body, CHECK_OUT_LABELS, year)
            .filter(|out| check_in.map(|inn| *out >= inn).unwrap_or(true));
        let nights = check_in
            .and_then(|inn| toolkit::nights_between(inn, check_out))
            .or_else(|| toolkit::capture_u32(body, std::slice::from_ref(&*NIGHTS)));
        Self {
            check_in,
            check_out,
            check_in_time: toolkit::labeled_time(body, CHECK_IN_LABELS),
            check_out_time: toolkit::labeled_time(body, CHECK_OUT_LABELS),
            guests: read_guests(body),
            nights,
            price: toolkit::parse_price(body),
        }
    }

    /// Copy dates, times, counts and price onto `record`.
    pub fn apply(&self, record: &mut BookingRecord) {
        if let Some(date) = self.check_in {
            record.start_date = date;
        }
        record.end_date = self.check_out;
        record.start_time = self.check_in_time.clone();
        record.end_time = self.check_out_time.clone();
        record.details.guests = self.guests;
        record.details.nights = self.nights;
        apply_price(record, self.price.clone());
    }
}

pub(crate) fn read_guests(text: &str) -> Option<u32> {
    toolkit::capture_u32(text, std::slice::from_ref(&*GUESTS_LABELED))
        .or_else(|| toolkit::capture_u32(text, std::slice::from_ref(&*GUESTS)))
        .filter(|g| *g > 0)
}

pub(crate) fn nightly_rate(text: &str) -> Option<f64> {
    toolkit::capture_first(text, std::slice::from_ref(&*RATE_TIMES_NIGHTS))
        .or_else(|| toolkit::capture_first(text, std::slice::from_ref(&*RATE_PER_NIGHT)))
        .and_then(|s| toolkit::parse_amount(&s))
        .or_else(|| toolkit::labeled_amount(text, &["nightly rate", "rate per night", "average nightly"]))
}

pub(crate) fn apply_price(record: &mut BookingRecord, price: Option<Money>) {
    if let Some(money) = price {
        record.total_price = Some(money.amount);
        record.currency = money.currency;
    }
}

/// `"Modern Apartment in Austin"` yields `"Austin"`.
pub(crate) fn trailing_city(title: &str) -> Option<String> {
    TRAILING_CITY
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Cut a captured name at the first connective that starts a new clause.
pub(crate) fn clean_name(raw: &str) -> Option<String> {
    let mut name = raw.trim();
    for stop in [
        " is confirmed",
        " has been",
        " is ",
        " on ",
        " for ",
        " from ",
        " - ",
        " – ",
        " | ",
        ", ",
    ] {
        if let Some(pos) = name.find(stop) {
            name = &name[..pos];
        }
    }
    let name = name
        .trim()
        .trim_end_matches(|c: char| c == '!' || c == '.' || c == ',' || c == ':')
        .trim();
    (!name.is_empty() && name.len() <= 120).then(|| name.to_string())
}

/// Record confidence from detector strength and which fields were found.
pub(crate) fn confidence_for(
    signals: &DetectionSignalSet,
    required: &[bool],
    optional: &[bool],
) -> f64 {
    toolkit::score_confidence(signals.mean_strong_confidence(), required, optional)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stay_reads_dates_times_and_counts() {
        let email = RawEmail::new(
            "m",
            "x@y.com",
            "Trip",
            "Tue, 5 Mar 2024 10:00:00 +0000",
            "Check-in: March 15 after 3:00 PM\nCheckout: March 18, 11:00 AM\n2 guests\nTotal: $450.00",
        );
        let stay = Stay::read(&email);
        assert_eq!(stay.check_in, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(stay.check_out, NaiveDate::from_ymd_opt(2024, 3, 18));
        assert_eq!(stay.check_in_time.as_deref(), Some("15:00"));
        assert_eq!(stay.check_out_time.as_deref(), Some("11:00"));
        assert_eq!(stay.guests, Some(2));
        assert_eq!(stay.nights, Some(3));
        assert_eq!(stay.price.map(|p| p.amount), Some(450.0));
    }

    #[test]
    fn checkout_before_checkin_is_dropped() {
        let email = RawEmail::new(
            "m",
            "x@y.com",
            "Trip",
            "",
            "Check-in: March 18, 2024\nCheckout: March 15, 2024",
        );
        let stay = Stay::read(&email);
        assert!(stay.check_in.is_some());
        assert!(stay.check_out.is_none());
        assert!(stay.nights.is_none());
    }

    #[test]
    fn nightly_rate_shapes() {
        assert_eq!(nightly_rate("$150.00 x 3 nights"), Some(150.0));
        assert_eq!(nightly_rate("Only $99 per night"), Some(99.0));
        assert_eq!(nightly_rate("Nightly rate: $120"), Some(120.0));
        assert_eq!(nightly_rate("no rate"), None);
    }

    #[test]
    fn names_are_cut_at_connectives() {
        assert_eq!(clean_name("Nopa is confirmed!").as_deref(), Some("Nopa"));
        assert_eq!(
            clean_name("Hilton Garden Inn Austin on March 15").as_deref(),
            Some("Hilton Garden Inn Austin")
        );
        assert_eq!(clean_name("   "), None);
        assert_eq!(trailing_city("Modern Apartment in Austin").as_deref(), Some("Austin"));
    }
}
