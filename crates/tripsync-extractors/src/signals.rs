//! Independent detection checks combined into a claim decision.
//!
//! Each check is pure and yields a [`DetectionSignal`]. An extractor claims an
//! email once at least `min_signals` of them are strong (matched with
//! confidence above 0.5).

use regex::Regex;
use tripsync_core::{
    DetectionSignal, DetectionSignalSet, RawEmail, SignalKind, DEFAULT_MIN_SIGNALS,
};

use crate::toolkit;

pub const EXACT_DOMAIN_CONFIDENCE: f64 = 1.0;
pub const LOOSE_DOMAIN_CONFIDENCE: f64 = 0.65;
pub const SUBJECT_CONFIDENCE: f64 = 0.85;
pub const BRAND_IN_SUBJECT_CONFIDENCE: f64 = 0.95;
pub const BRAND_IN_BODY_CONFIDENCE: f64 = 0.85;
pub const STRUCTURE_BASE_CONFIDENCE: f64 = 0.6;
pub const STRUCTURE_PER_CUE: f64 = 0.06;
pub const STRUCTURE_MIN_CUES: usize = 3;
const STRUCTURE_MAX_CONFIDENCE: f64 = 0.95;

/// Check-in/out markers, room and property words, guest and night counts.
pub const LODGING_CUES: &[&str] = &[
    r"check[\s-]?in",
    r"check[\s-]?out",
    r"\b(?:room|suite|property|apartment|listing|home|villa|cabin|condo)\b",
    r"\b\d+\s+(?:guests?|adults?)\b",
    r"\b\d+\s+nights?\b",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProfile<'a> {
    /// Known sender domains; subdomains match too.
    pub domains: &'a [&'a str],
    /// Looser sender pattern scored below an exact domain.
    pub domain_pattern: Option<&'a str>,
    pub subject_patterns: &'a [&'a str],
    /// Brand names searched as whole words in subject and body.
    pub brands: &'a [&'a str],
    /// Structural cue patterns, matched case-insensitively.
    pub cues: &'a [&'a str],
    /// Zero means [`DEFAULT_MIN_SIGNALS`].
    pub min_signals: usize,
    /// Single-domain providers: only an exact domain hit may claim.
    pub require_exact_domain: bool,
    /// A subject-pattern hit is mandatory.
    pub require_subject: bool,
    /// Provider families: a domain or brand hit must be among the signals.
    pub require_identity: bool,
}

#[derive(Debug, Clone)]
pub struct SignalDetector {
    domains: Vec<String>,
    domain_pattern: Option<Regex>,
    subject_patterns: Vec<Regex>,
    brands: Vec<(String, Regex)>,
    cues: Vec<Regex>,
    min_signals: usize,
    require_exact_domain: bool,
    require_subject: bool,
    require_identity: bool,
}

impl SignalDetector {
    pub fn new(profile: SignalProfile<'_>) -> Result<Self, regex::Error> {
        let case_insensitive = |p: &&str| Regex::new(&format!("(?i){p}"));
        Ok(Self {
            domains: profile
                .domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            domain_pattern: profile
                .domain_pattern
                .as_ref()
                .map(case_insensitive)
                .transpose()?,
            subject_patterns: profile
                .subject_patterns
                .iter()
                .map(case_insensitive)
                .collect::<Result<_, _>>()?,
            brands: profile
                .brands
                .iter()
                .map(|b| Ok((b.to_ascii_lowercase(), Regex::new(&toolkit::word_pattern(b))?)))
                .collect::<Result<_, regex::Error>>()?,
            cues: profile
                .cues
                .iter()
                .map(case_insensitive)
                .collect::<Result<_, _>>()?,
            min_signals: if profile.min_signals == 0 {
                DEFAULT_MIN_SIGNALS
            } else {
                profile.min_signals
            },
            require_exact_domain: profile.require_exact_domain,
            require_subject: profile.require_subject,
            require_identity: profile.require_identity,
        })
    }

    pub fn check_domain(&self, email: &RawEmail) -> DetectionSignal {
        let Some(host) = sender_domain(email) else {
            return DetectionSignal::miss("domain");
        };
        if let Some(domain) = self.domains.iter().find(|d| domain_matches(&host, d)) {
            return DetectionSignal::hit("domain", EXACT_DOMAIN_CONFIDENCE, Some(domain.clone()));
        }
        match &self.domain_pattern {
            Some(re) if re.is_match(&email.sender_address()) => {
                DetectionSignal::hit("domain_pattern", LOOSE_DOMAIN_CONFIDENCE, Some(host))
            }
            _ => DetectionSignal::miss("domain"),
        }
    }

    pub fn check_subject(&self, email: &RawEmail) -> DetectionSignal {
        self.subject_patterns
            .iter()
            .find_map(|re| re.find(&email.subject))
            .map(|m| DetectionSignal::hit("subject", SUBJECT_CONFIDENCE, Some(m.as_str().to_string())))
            .unwrap_or_else(|| DetectionSignal::miss("subject"))
    }

    pub fn check_content(&self, email: &RawEmail) -> DetectionSignal {
        if let Some((brand, _)) = self.brands.iter().find(|(_, re)| re.is_match(&email.subject)) {
            return DetectionSignal::hit("brand_subject", BRAND_IN_SUBJECT_CONFIDENCE, Some(brand.clone()));
        }
        match self.brands.iter().find(|(_, re)| re.is_match(&email.body)) {
            Some((brand, _)) => {
                DetectionSignal::hit("brand_body", BRAND_IN_BODY_CONFIDENCE, Some(brand.clone()))
            }
            None => DetectionSignal::miss("brand"),
        }
    }

    pub fn check_structure(&self, email: &RawEmail) -> DetectionSignal {
        let cues = self.cues.iter().filter(|re| re.is_match(&email.body)).count();
        if cues < STRUCTURE_MIN_CUES {
            return DetectionSignal::miss("structure");
        }
        let confidence = (STRUCTURE_BASE_CONFIDENCE + STRUCTURE_PER_CUE * cues as f64)
            .min(STRUCTURE_MAX_CONFIDENCE);
        DetectionSignal::hit("structure", confidence, Some(format!("{cues} cues")))
    }

    pub fn detect(&self, email: &RawEmail) -> DetectionSignalSet {
        DetectionSignalSet::new()
            .with(SignalKind::Domain, self.check_domain(email))
            .with(SignalKind::Subject, self.check_subject(email))
            .with(SignalKind::Content, self.check_content(email))
            .with(SignalKind::Structure, self.check_structure(email))
    }

    pub fn is_claimed(&self, signals: &DetectionSignalSet) -> bool {
        if self.require_exact_domain {
            let exact = signals
                .get(SignalKind::Domain)
                .map(|s| s.matched && s.confidence >= EXACT_DOMAIN_CONFIDENCE)
                .unwrap_or(false);
            if !exact {
                return false;
            }
        }
        if self.require_subject && !signals.is_matched(SignalKind::Subject) {
            return false;
        }
        if self.require_identity
            && !signals.is_matched(SignalKind::Domain)
            && !signals.is_matched(SignalKind::Content)
        {
            return false;
        }
        signals.meets(self.min_signals)
    }

    pub fn claims(&self, email: &RawEmail) -> bool {
        self.is_claimed(&self.detect(email))
    }
}

/// Host part of the sender address, lowercased.
pub fn sender_domain(email: &RawEmail) -> Option<String> {
    let addr = email.sender_address();
    let (_, host) = addr.rsplit_once('@')?;
    let host = host.trim().trim_end_matches('.');
    (!host.is_empty()).then(|| host.to_string())
}

/// `host` is `domain` or one of its subdomains.
pub fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> SignalDetector {
        SignalDetector::new(SignalProfile {
            domains: &["airbnb.com"],
            domain_pattern: Some(r"@.*\bstays?\b"),
            subject_patterns: &[r"reservation\s+confirmed"],
            brands: &["airbnb"],
            cues: LODGING_CUES,
            ..SignalProfile::default()
        })
        .unwrap()
    }

    fn email(from: &str, subject: &str, body: &str) -> RawEmail {
        RawEmail::new("m", from, subject, "", body)
    }

    #[test]
    fn exact_domain_and_subdomains_score_full() {
        let d = detector();
        let sig = d.check_domain(&email("Airbnb <automated@airbnb.com>", "", ""));
        assert!(sig.matched);
        assert_eq!(sig.confidence, 1.0);
        assert!(d.check_domain(&email("x@mail.airbnb.com", "", "")).matched);
        assert!(!d.check_domain(&email("x@notairbnb.com", "", "")).matched);
    }

    #[test]
    fn loose_domain_pattern_scores_lower() {
        let d = detector();
        let sig = d.check_domain(&email("hello@stay.example.com", "", ""));
        assert!(sig.matched);
        assert_eq!(sig.confidence, LOOSE_DOMAIN_CONFIDENCE);
    }

    #[test]
    fn brand_in_subject_beats_brand_in_body() {
        let d = detector();
        let subject = d.check_content(&email("x@y.com", "Your Airbnb trip", ""));
        let body = d.check_content(&email("x@y.com", "Trip", "Booked on Airbnb"));
        assert!(subject.confidence > body.confidence);
        assert!(body.is_strong());
    }

    #[test]
    fn structure_needs_three_cues() {
        let d = detector();
        let two = d.check_structure(&email("x@y.com", "", "Check-in Friday\nCheckout Monday"));
        assert!(!two.matched);
        let four = d.check_structure(&email(
            "x@y.com",
            "",
            "Check-in Friday\nCheckout Monday\n2 guests\n3 nights",
        ));
        assert!(four.matched);
        assert!(four.confidence > STRUCTURE_BASE_CONFIDENCE);
    }

    #[test]
    fn claim_needs_two_strong_signals() {
        let d = detector();
        assert!(d.claims(&email("a@airbnb.com", "Reservation confirmed - Loft", "")));
        assert!(!d.claims(&email("a@airbnb.com", "Weekly newsletter", "")));
        assert!(!d.claims(&email("a@gmail.com", "Hello", "nothing")));
    }

    #[test]
    fn identity_requirement_ignores_generic_structure() {
        let d = SignalDetector::new(SignalProfile {
            domains: &["opentable.com"],
            subject_patterns: &[r"reservation\s+confirmed"],
            brands: &["opentable"],
            cues: LODGING_CUES,
            require_identity: true,
            ..SignalProfile::default()
        })
        .unwrap();
        let generic = email(
            "front-desk@smallinn.test",
            "Reservation confirmed",
            "Check-in Friday\nCheckout Monday\n2 guests\n3 nights",
        );
        assert!(d.detect(&generic).meets(2));
        assert!(!d.claims(&generic));
    }

    #[test]
    fn exact_domain_requirement_blocks_forwarded_mail() {
        let d = SignalDetector::new(SignalProfile {
            domains: &["airbnb.com"],
            subject_patterns: &[r"reservation\s+confirmed"],
            brands: &["airbnb"],
            require_exact_domain: true,
            ..SignalProfile::default()
        })
        .unwrap();
        assert!(!d.claims(&email("friend@gmail.com", "Fwd: Airbnb reservation confirmed", "")));
        assert!(d.claims(&email("automated@airbnb.com", "Reservation confirmed", "")));
    }

    #[test]
    fn brands_match_on_word_boundaries() {
        let d = SignalDetector::new(SignalProfile {
            brands: &["accor", "w hotels"],
            ..SignalProfile::default()
        })
        .unwrap();
        assert!(!d.check_content(&email("x@y.com", "Hi", "According to our policy")).matched);
        assert!(d.check_content(&email("x@y.com", "Hi", "Booked via ALL Accor")).matched);
        assert!(d.check_content(&email("x@y.com", "Your W Hotels stay", "")).matched);
    }

    #[test]
    fn subject_requirement_rejects_domain_plus_brand() {
        let d = SignalDetector::new(SignalProfile {
            domains: &["airbnb.com"],
            subject_patterns: &[r"reservation\s+confirmed"],
            brands: &["airbnb"],
            require_exact_domain: true,
            require_subject: true,
            ..SignalProfile::default()
        })
        .unwrap();
        assert!(!d.claims(&email("news@airbnb.com", "Summer ideas", "The Airbnb team")));
        assert!(d.claims(&email("automated@airbnb.com", "Reservation confirmed", "")));
    }
}
