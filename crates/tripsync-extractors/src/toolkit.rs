//! Shared field-extraction helpers used by every provider extractor.
//!
//! Dates try a fixed list of literal formats before a normalising fallback;
//! prices strip separators and symbols and accept `$X`, `USD X` and
//! `Total: X` shapes; times always come back as zero-padded 24-hour `HH:MM`.
//! None of these helpers fail loudly: an unparseable value is `None`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tripsync_core::{clamp_unit, BookingStatus, RawEmail};

pub const DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%A, %B %d, %Y",
    "%a, %b %d, %Y",
    "%A %B %d, %Y",
    "%a %b %d, %Y",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const FALLBACK_FORMATS: &[&str] = &[
    "%B %d %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%d %b %Y",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m/%d %Y",
    "%Y/%m/%d",
    "%Y-%m-%d",
];

const WEEKDAYS: &[&str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

pub const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "CAD", "AUD", "NZD", "JPY", "CHF", "MXN", "INR", "SGD", "HKD", "SEK",
    "NOK", "DKK", "BRL", "ZAR",
];

static DATE_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+)?(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?\b(?:,?\s+\d{4}\b)?|\b\d{1,2}(?:st|nd|rd|th)?\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?(?:\s+\d{4}\b)?|\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}/\d{1,2}/\d{2,4}\b",
    )
    .expect("date candidate pattern")
});

static TIME_12H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*([ap])\.?\s?m\b\.?").expect("12h time pattern")
});

static TIME_24H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("24h time pattern"));

static PRICE_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?i:grand\s+total|total(?:\s+(?:price|cost|amount|charged|paid|due))?)\s*(?:\([^)\n]*\))?\s*[:\-]?\s*(?:(?P<pre>[A-Z]{3})\s*)?(?P<sym>[$€£¥])?\s*(?P<amt>\d[\d,]*(?:\.\d{1,2})?)(?:\s*(?P<post>[A-Z]{3})\b)?",
    )
    .expect("total price pattern")
});

static PRICE_SYMBOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<sym>[$€£¥])\s*(?P<amt>\d[\d,]*(?:\.\d{1,2})?)(?:\s*(?P<post>[A-Z]{3})\b)?")
        .expect("symbol price pattern")
});

static PRICE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<pre>[A-Z]{3})\s*(?P<amt>\d[\d,]*(?:\.\d{1,2})?)").expect("code price pattern")
});

static STREET_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\d{1,6}\s+(?:[A-Za-z0-9.'-]+\s+){0,5}(?:St|Street|Ave|Avenue|Rd|Road|Blvd|Boulevard|Dr|Drive|Ln|Lane|Way|Pl|Place|Ct|Court|Hwy|Highway|Pkwy|Parkway|Sq|Square)\b\.?(?:,\s*[A-Za-z0-9 .'-]+){0,3}",
    )
    .expect("street address pattern")
});

static EMAIL_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});

static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}").expect("phone pattern")
});

/// Parse a date, filling a missing year with the current one.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    parse_date_with_year(text, Utc::now().year())
}

/// Parse a date; `default_year` is used when the text carries no year.
pub fn parse_date_with_year(text: &str, default_year: i32) -> Option<NaiveDate> {
    let s = text
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == ',' || c.is_whitespace());
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }

    let cleaned = normalize_date_text(s);
    if cleaned.is_empty() {
        return None;
    }
    let has_year = cleaned
        .split(|c: char| !c.is_ascii_digit())
        .any(|tok| tok.len() == 4)
        || cleaned.matches('/').count() == 2;
    let candidate = if has_year {
        cleaned
    } else {
        format!("{cleaned} {default_year}")
    };

    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&candidate, fmt).ok())
}

fn normalize_date_text(s: &str) -> String {
    s.to_ascii_lowercase()
        .replace(&[',', '.'][..], " ")
        .split_whitespace()
        .filter(|tok| {
            let is_weekday = tok.chars().all(|c| c.is_ascii_alphabetic())
                && WEEKDAYS.iter().any(|w| tok.starts_with(w));
            !is_weekday && *tok != "at" && *tok != "on"
        })
        .map(|tok| {
            if tok.starts_with("sept") {
                return "sep".to_string();
            }
            let digits = tok.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            let suffix = &tok[digits.len()..];
            if !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
                && matches!(suffix, "st" | "nd" | "rd" | "th")
            {
                digits.to_string()
            } else {
                tok.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every parseable date in `text`, in document order.
pub fn find_dates(text: &str, default_year: i32) -> Vec<NaiveDate> {
    DATE_CANDIDATE
        .find_iter(text)
        .filter_map(|m| parse_date_with_year(m.as_str(), default_year))
        .collect()
}

pub fn first_date(text: &str, default_year: i32) -> Option<NaiveDate> {
    find_dates(text, default_year).into_iter().next()
}

/// Date on the line carrying one of `labels`, or on the line right after it.
pub fn labeled_date(text: &str, labels: &[&str], default_year: i32) -> Option<NaiveDate> {
    labeled_window(text, labels)
        .into_iter()
        .find_map(|(rest, next)| {
            first_date(&rest, default_year).or_else(|| next.and_then(|n| first_date(&n, default_year)))
        })
}

/// Time on the line carrying one of `labels`.
pub fn labeled_time(text: &str, labels: &[&str]) -> Option<String> {
    labeled_window(text, labels)
        .into_iter()
        .find_map(|(rest, _)| parse_time(&rest))
}

/// Remainder of the first line containing one of `labels`, minus separators.
pub fn labeled_value(text: &str, labels: &[&str]) -> Option<String> {
    labeled_window(text, labels)
        .into_iter()
        .find_map(|(rest, next)| {
            if rest.is_empty() {
                next.filter(|n| !n.is_empty())
            } else {
                Some(rest)
            }
        })
}

fn labeled_window(text: &str, labels: &[&str]) -> Vec<(String, Option<String>)> {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let lower = line.to_ascii_lowercase();
        for label in labels {
            if let Some(pos) = lower.find(&label.to_ascii_lowercase()) {
                let rest = line[pos + label.len()..]
                    .trim_start_matches(|c: char| {
                        c == ':' || c == '-' || c == '#' || c.is_whitespace()
                    })
                    .trim()
                    .to_string();
                let next = lines.get(idx + 1).map(|n| n.trim().to_string());
                out.push((rest, next));
                break;
            }
        }
    }
    out
}

/// Every time in `text` as `(byte offset, "HH:MM")`, in document order.
pub fn find_times(text: &str) -> Vec<(usize, String)> {
    let mut found: Vec<(usize, usize, String)> = Vec::new();
    for caps in TIME_12H.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let hour: u32 = match caps.get(1).and_then(|m| m.as_str().parse().ok()) {
            Some(h) if (1..=12).contains(&h) => h,
            _ => continue,
        };
        let minute: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let pm = caps
            .get(3)
            .map(|m| m.as_str().eq_ignore_ascii_case("p"))
            .unwrap_or(false);
        let hour24 = (hour % 12) + if pm { 12 } else { 0 };
        found.push((whole.start(), whole.end(), format!("{hour24:02}:{minute:02}")));
    }
    for caps in TIME_24H.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let overlaps = found
            .iter()
            .any(|(start, end, _)| whole.start() < *end && whole.end() > *start);
        if overlaps {
            continue;
        }
        let hour: u32 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        found.push((whole.start(), whole.end(), format!("{hour:02}:{minute:02}")));
    }
    found.sort_by_key(|(start, _, _)| *start);
    found.into_iter().map(|(start, _, t)| (start, t)).collect()
}

pub fn parse_time(text: &str) -> Option<String> {
    find_times(text).into_iter().next().map(|(_, t)| t)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    pub amount: f64,
    pub currency: Option<String>,
}

/// Strip separators and currency symbols; `"$1,234.50"` becomes `1234.5`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// First price found, trying `Total: X`, then `$X`, then `USD X`.
pub fn parse_price(text: &str) -> Option<Money> {
    [&*PRICE_TOTAL, &*PRICE_SYMBOL, &*PRICE_CODE]
        .iter()
        .find_map(|re| {
            re.captures_iter(text).find_map(|caps| {
                let amount = parse_amount(caps.name("amt")?.as_str())?;
                let code = caps
                    .name("pre")
                    .or_else(|| caps.name("post"))
                    .map(|m| m.as_str())
                    .filter(|c| CURRENCY_CODES.contains(c));
                let symbol = caps.name("sym").map(|m| m.as_str());
                if code.is_none() && symbol.is_none() && caps.name("pre").is_some() {
                    return None;
                }
                let currency = code
                    .map(ToString::to_string)
                    .or_else(|| symbol.and_then(currency_for_symbol).map(ToString::to_string));
                Some(Money { amount, currency })
            })
        })
}

pub fn currency_for_symbol(symbol: &str) -> Option<&'static str> {
    match symbol {
        "$" => Some("USD"),
        "€" => Some("EUR"),
        "£" => Some("GBP"),
        "¥" => Some("JPY"),
        _ => None,
    }
}

/// Amount on the line carrying one of `labels`.
pub fn labeled_amount(text: &str, labels: &[&str]) -> Option<f64> {
    labeled_window(text, labels).into_iter().find_map(|(rest, _)| {
        parse_price(&rest)
            .map(|m| m.amount)
            .or_else(|| rest.split_whitespace().find_map(parse_amount))
    })
}

pub fn capture_first(text: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

pub fn capture_u32(text: &str, patterns: &[Regex]) -> Option<u32> {
    capture_first(text, patterns).and_then(|s| s.parse().ok())
}

/// Confirmation codes must carry at least one digit and five characters.
pub fn looks_like_code(candidate: &str) -> bool {
    candidate.len() >= 5 && candidate.chars().any(|c| c.is_ascii_digit())
}

pub fn find_code(text: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures_iter(text).find_map(|c| {
            c.get(1)
                .map(|m| m.as_str().trim().trim_end_matches(|c: char| c == '.' || c == '-').to_string())
                .filter(|s| looks_like_code(s))
        })
    })
}

pub fn find_street_address(text: &str) -> Option<String> {
    STREET_ADDRESS
        .find(text)
        .map(|m| m.as_str().trim().trim_end_matches(',').to_string())
}

pub fn find_email_address(text: &str) -> Option<String> {
    EMAIL_ADDRESS.find(text).map(|m| m.as_str().to_string())
}

pub fn find_phone_number(text: &str) -> Option<String> {
    PHONE_NUMBER.find(text).map(|m| m.as_str().trim().to_string())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive regex for `keyword` as a whole word; a plural `s`/`es`
/// may follow.
pub fn word_pattern(keyword: &str) -> String {
    let start = if keyword.starts_with(is_word_char) { r"\b" } else { "" };
    let end = if keyword.ends_with(is_word_char) { r"(?:e?s)?\b" } else { "" };
    format!("(?i){start}{}{end}", regex::escape(keyword))
}

/// `needle` occurs in already-lowercased `lower` as a whole word, so "thai"
/// does not match "thailand".
pub fn contains_word(lower: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    lower.match_indices(needle).any(|(at, _)| {
        let starts_clean = !needle.starts_with(is_word_char)
            || !lower[..at].chars().next_back().is_some_and(is_word_char);
        let rest = &lower[at + needle.len()..];
        let ends_clean = !needle.ends_with(is_word_char)
            || ["", "s", "es"].iter().any(|suffix| {
                rest.strip_prefix(suffix)
                    .is_some_and(|tail| !tail.starts_with(is_word_char))
            });
        starts_clean && ends_clean
    })
}

/// Canonical names of every `(needle, canonical)` pair whose needle occurs in `text`.
pub fn scan_keywords(text: &str, table: &[(&str, &str)]) -> Vec<String> {
    let lower = text.to_ascii_lowercase();
    let mut out: Vec<String> = Vec::new();
    for (needle, canonical) in table {
        if contains_word(&lower, needle) && !out.iter().any(|c| c == canonical) {
            out.push((*canonical).to_string());
        }
    }
    out
}

pub fn first_keyword<'a>(text: &str, table: &[(&str, &'a str)]) -> Option<&'a str> {
    let lower = text.to_ascii_lowercase();
    table
        .iter()
        .find(|(needle, _)| contains_word(&lower, needle))
        .map(|(_, canonical)| *canonical)
}

pub fn detect_status(email: &RawEmail) -> BookingStatus {
    let subject = email.subject.to_ascii_lowercase();
    if subject.contains("cancel") {
        return BookingStatus::Cancelled;
    }
    if ["pending", "request", "awaiting", "on hold"]
        .iter()
        .any(|k| subject.contains(k))
    {
        return BookingStatus::Pending;
    }
    let body = email.body.to_ascii_lowercase();
    if [
        "has been cancelled",
        "has been canceled",
        "reservation cancelled",
        "reservation canceled",
        "booking cancelled",
        "booking canceled",
        "cancellation confirmed",
    ]
    .iter()
    .any(|k| body.contains(k))
    {
        return BookingStatus::Cancelled;
    }
    BookingStatus::Confirmed
}

/// Text after the last ` - `, ` | ` or `: ` separator of a subject line.
pub fn subject_tail(subject: &str) -> Option<String> {
    [" - ", " – ", " | ", ": "]
        .iter()
        .filter_map(|sep| subject.rfind(sep).map(|pos| &subject[pos + sep.len()..]))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .min_by_key(|s| s.len())
}

pub fn nights_between(start: NaiveDate, end: Option<NaiveDate>) -> Option<u32> {
    let days = (end? - start).num_days();
    u32::try_from(days).ok().filter(|d| *d > 0)
}

/// Blend detector strength with field completeness into a 0-1 confidence.
pub fn score_confidence(signal_strength: f64, required: &[bool], optional: &[bool]) -> f64 {
    let ratio = |flags: &[bool]| {
        if flags.is_empty() {
            1.0
        } else {
            flags.iter().filter(|f| **f).count() as f64 / flags.len() as f64
        }
    };
    clamp_unit(signal_strength * 0.6 + ratio(required) * 0.3 + ratio(optional) * 0.1)
}

/// Fallback start date: the email's own date, else today.
pub fn email_date_or_today(email: &RawEmail) -> NaiveDate {
    email
        .sent_at()
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn literal_formats_parse() {
        assert_eq!(parse_date_with_year("March 15, 2024", 2000), Some(d(2024, 3, 15)));
        assert_eq!(parse_date_with_year("2024-05-10", 2000), Some(d(2024, 5, 10)));
        assert_eq!(parse_date_with_year("05/10/2024", 2000), Some(d(2024, 5, 10)));
        assert_eq!(parse_date_with_year("Fri, Mar 15, 2024", 2000), Some(d(2024, 3, 15)));
    }

    #[test]
    fn fallback_handles_ordinals_weekdays_and_missing_year() {
        assert_eq!(parse_date_with_year("Friday 15th March", 2024), Some(d(2024, 3, 15)));
        assert_eq!(parse_date_with_year("May 10", 2024), Some(d(2024, 5, 10)));
        assert_eq!(parse_date_with_year("Sept 3rd, 2025", 2000), Some(d(2025, 9, 3)));
    }

    #[test]
    fn full_month_names_without_year() {
        assert_eq!(parse_date_with_year("March 15", 2024), Some(d(2024, 3, 15)));
        assert_eq!(parse_date_with_year("15th March", 2024), Some(d(2024, 3, 15)));
        assert_eq!(parse_date_with_year("December 1st", 2023), Some(d(2023, 12, 1)));
        assert_eq!(first_date("Check-in: September 9 from 4 PM", 2024), Some(d(2024, 9, 9)));
    }

    #[test]
    fn garbage_dates_are_absent() {
        assert_eq!(parse_date_with_year("not a date", 2024), None);
        assert_eq!(parse_date_with_year("", 2024), None);
        assert_eq!(parse_date_with_year("February 30, 2024", 2024), None);
    }

    #[test]
    fn labeled_dates_read_same_or_next_line() {
        let body = "Check-in: March 15, 2024\nCheckout\nMon, Mar 18, 2024";
        assert_eq!(labeled_date(body, &["check-in"], 2024), Some(d(2024, 3, 15)));
        assert_eq!(labeled_date(body, &["checkout"], 2024), Some(d(2024, 3, 18)));
        assert_eq!(labeled_date(body, &["arrival"], 2024), None);
    }

    #[test]
    fn times_normalize_to_24h() {
        assert_eq!(parse_time("arrive by 3:00 PM").as_deref(), Some("15:00"));
        assert_eq!(parse_time("12 am sharp").as_deref(), Some("00:00"));
        assert_eq!(parse_time("12:30 p.m.").as_deref(), Some("12:30"));
        assert_eq!(parse_time("departs 7:05").as_deref(), Some("07:05"));
        assert_eq!(parse_time("at 19:45").as_deref(), Some("19:45"));
        assert_eq!(parse_time("2 amenities"), None);
    }

    #[test]
    fn find_times_keeps_document_order() {
        let times: Vec<String> = find_times("Departs 14:05, arrives 5:30 PM")
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(times, vec!["14:05".to_string(), "17:30".to_string()]);
    }

    #[test]
    fn price_shapes() {
        assert_eq!(
            parse_price("Total: $450.00 USD"),
            Some(Money { amount: 450.0, currency: Some("USD".into()) })
        );
        assert_eq!(
            parse_price("You paid $1,234.50"),
            Some(Money { amount: 1234.5, currency: Some("USD".into()) })
        );
        assert_eq!(
            parse_price("Amount EUR 89.90"),
            Some(Money { amount: 89.9, currency: Some("EUR".into()) })
        );
        assert_eq!(
            parse_price("Total (3 nights): £300"),
            Some(Money { amount: 300.0, currency: Some("GBP".into()) })
        );
        assert_eq!(parse_price("no money here"), None);
    }

    #[test]
    fn total_wins_over_earlier_symbol_amount() {
        let body = "Nightly $100.00 x 3 nights\nCleaning fee $50.00\nTotal: $350.00";
        assert_eq!(parse_price(body).map(|m| m.amount), Some(350.0));
        assert_eq!(labeled_amount(body, &["cleaning fee"]), Some(50.0));
    }

    #[test]
    fn codes_need_a_digit() {
        assert!(looks_like_code("HMXK-ABCD-2024"));
        assert!(!looks_like_code("NUMBER"));
        assert!(!looks_like_code("A1"));
    }

    #[test]
    fn subject_tail_picks_listing_name() {
        assert_eq!(
            subject_tail("Reservation confirmed - Modern Apartment in Austin").as_deref(),
            Some("Modern Apartment in Austin")
        );
        assert_eq!(subject_tail("Plain subject"), None);
    }

    #[test]
    fn status_detection() {
        let cancelled = RawEmail::new("1", "a@b.com", "Reservation cancelled", "", "");
        let pending = RawEmail::new("2", "a@b.com", "Booking request sent", "", "");
        let confirmed = RawEmail::new(
            "3",
            "a@b.com",
            "Reservation confirmed",
            "",
            "See our cancellation policy",
        );
        assert_eq!(detect_status(&cancelled), BookingStatus::Cancelled);
        assert_eq!(detect_status(&pending), BookingStatus::Pending);
        assert_eq!(detect_status(&confirmed), BookingStatus::Confirmed);
    }

    #[test]
    fn confidence_blends_signal_and_completeness() {
        let full = score_confidence(1.0, &[true, true], &[true]);
        let sparse = score_confidence(1.0, &[true, false], &[false]);
        assert!((full - 1.0).abs() < 1e-9);
        assert!(sparse < full);
        assert!(score_confidence(2.0, &[true], &[true]) <= 1.0);
    }

    #[test]
    fn address_and_contact_helpers() {
        let text = "Stay at 123 Main Street, Austin, TX\nHost phone: (512) 555-0199\nhost@example.com";
        assert_eq!(
            find_street_address(text).as_deref(),
            Some("123 Main Street, Austin, TX")
        );
        assert_eq!(find_phone_number(text).as_deref(), Some("(512) 555-0199"));
        assert_eq!(find_email_address(text).as_deref(), Some("host@example.com"));
    }
}
