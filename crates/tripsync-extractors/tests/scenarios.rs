use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tripsync_core::{BookingType, RawEmail};
use tripsync_extractors::{
    AiFallbackExtractor, ExtractError, ExtractorRegistry, TextModel, AI_CONFIDENCE_CAP,
};

fn airbnb_email() -> RawEmail {
    RawEmail::new(
        "airbnb-1",
        "Airbnb <automated@airbnb.com>",
        "Reservation confirmed - Modern Apartment in Austin",
        "Mon, 04 Mar 2024 09:12:00 +0000",
        "Check-in: March 15, 2024\n\
         Check-out: March 18, 2024\n\
         Confirmation code: HMXK-ABCD-2024\n\
         Total: $450.00 USD",
    )
}

fn united_email() -> RawEmail {
    RawEmail::new(
        "united-1",
        "United Airlines <unitedairlines@united.com>",
        "Your trip confirmation - SFO to JFK",
        "Mon, 01 Apr 2024 10:00:00 -0700",
        "Confirmation number: KX7Q2M\n\
         UA 256  SFO → JFK\n\
         Departs: Fri, May 10, 2024 8:00 AM\n\
         UA 789  JFK → SFO\n\
         Departs: Wed, May 15, 2024 6:00 PM\n\
         Total: $612.80 USD",
    )
}

fn hilton_email() -> RawEmail {
    RawEmail::new(
        "hilton-1",
        "Hilton Honors <reservations@h1.hilton.com>",
        "Your reservation is confirmed at Hilton Garden Inn Austin Downtown",
        "Thu, 01 Feb 2024 08:00:00 -0600",
        "Confirmation Number: 3141592653\n\
         Arrival: Thursday, February 22, 2024\n\
         Departure: Sunday, February 25, 2024\n\
         Total for stay: $687.45",
    )
}

fn newsletter_email(id: &str) -> RawEmail {
    RawEmail::new(
        id,
        "news@shop.example",
        "Weekly deals",
        "Tue, 02 Apr 2024 10:00:00 +0000",
        "Half off garden furniture this weekend only.",
    )
}

fn tour_email() -> RawEmail {
    RawEmail::new(
        "tour-1",
        "Harbor Tours <hello@harbortours.example>",
        "Your tour booking",
        "Mon, 10 Jun 2024 09:00:00 +0000",
        "Thanks for booking the Sunset Sail on June 21 at 6:30 PM. Ref SHC-88231.",
    )
}

struct CountingModel {
    reply: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl TextModel for CountingModel {
    async fn complete(&self, _prompt: &str) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.to_string())
    }
}

#[tokio::test]
async fn rental_confirmation_scenario() {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let record = registry.parse_one(&airbnb_email(), None).await.unwrap();

    assert_eq!(record.provider, "airbnb");
    assert_eq!(record.booking_type, BookingType::Accommodation);
    assert_eq!(record.start_date.to_string(), "2024-03-15");
    assert_eq!(record.end_date.unwrap().to_string(), "2024-03-18");
    assert_eq!(record.confirmation_number.as_deref(), Some("HMXK-ABCD-2024"));
    assert_eq!(record.total_price, Some(450.0));
    assert_eq!(record.currency.as_deref(), Some("USD"));
    assert_eq!(record.parser.extractor, "airbnb");
}

#[tokio::test]
async fn two_segment_flight_scenario() {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let record = registry.parse_one(&united_email(), None).await.unwrap();

    assert_eq!(record.provider, "airline");
    assert_eq!(record.booking_type, BookingType::Flight);
    assert_eq!(record.start_date.to_string(), "2024-05-10");
    let legs = &record.details.all_flights;
    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].flight_number, "UA256");
    assert_eq!(legs[0].departure_airport.as_deref(), Some("SFO"));
    assert_eq!(legs[1].flight_number, "UA789");
    assert_eq!(legs[1].departure_airport.as_deref(), Some("JFK"));
}

#[tokio::test]
async fn batch_of_ten_keeps_input_order() {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let mut emails = Vec::new();
    for i in 0..10 {
        let mut email = match i % 4 {
            0 => airbnb_email(),
            1 => united_email(),
            2 => hilton_email(),
            _ => newsletter_email("news"),
        };
        email.id = format!("batch-{i}");
        emails.push(email);
    }

    let results = registry.parse_batch(&emails, 5, None, None, None).await;

    assert_eq!(results.len(), 10);
    for (i, result) in results.iter().enumerate() {
        match i % 4 {
            3 => assert!(result.is_none(), "newsletter at {i} should not parse"),
            _ => {
                let record = result.as_ref().unwrap();
                assert_eq!(record.source_email_id, format!("batch-{i}"));
                let expected = ["airbnb", "airline", "hotel_chain"][i % 4];
                assert_eq!(record.provider, expected);
            }
        }
    }
}

#[tokio::test]
async fn unclaimed_travel_email_goes_to_ai_fallback() {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let model = Arc::new(CountingModel {
        reply: r#"{"provider": "harbor tours", "booking_type": "activity", "title": "Sunset Sail",
                   "confirmation_number": "SHC-88231", "start_date": "2024-06-21",
                   "start_time": "18:30", "location": null, "total_price": null,
                   "currency": null, "details": {}}"#,
        calls: AtomicUsize::new(0),
    });
    let fallback = AiFallbackExtractor::new(model.clone());

    let record = registry
        .parse_one(&tour_email(), Some(&fallback))
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(record.parser.extractor, "ai_fallback");
    assert_eq!(record.title, "Sunset Sail");
    assert!(record.confidence() <= AI_CONFIDENCE_CAP);

    // no travel keyword: the fallback is never consulted
    assert!(registry
        .parse_one(&newsletter_email("n"), Some(&fallback))
        .await
        .is_none());
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn claimed_email_never_reaches_fallback() {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let model = Arc::new(CountingModel {
        reply: "{}",
        calls: AtomicUsize::new(0),
    });
    let fallback = AiFallbackExtractor::new(model.clone());

    let record = registry
        .parse_one(&hilton_email(), Some(&fallback))
        .await
        .unwrap();
    assert_eq!(record.provider, "hotel_chain");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn odd_inputs_never_escape_the_registry() {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let inputs = [
        RawEmail::new("", "", "", "", ""),
        RawEmail::new("x", "not an address", "✈✈✈", "garbage date", "\u{0}\u{1}"),
        RawEmail::new(
            "y",
            "noreply@booking.com",
            "Your booking is confirmed",
            "",
            "Check-in: 31 February 2024\nTotal: €",
        ),
    ];
    for email in &inputs {
        if let Some(record) = registry.parse_one(email, None).await {
            assert!(!record.provider.is_empty());
            assert!((0.0..=1.0).contains(&record.confidence()));
        }
    }
}

#[tokio::test]
async fn provider_marketing_and_lookalike_words_fall_through() {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let newsletter = RawEmail::new(
        "promo-1",
        "Airbnb <news@airbnb.com>",
        "Explore summer stays near you",
        "Mon, 04 Mar 2024 09:12:00 +0000",
        "Cabins, lofts and beach homes are waiting.\nThanks, the Airbnb team",
    );
    assert!(registry.parse_one(&newsletter, None).await.is_none());

    let inn = RawEmail::new(
        "inn-1",
        "desk@smallinn.example",
        "Reservation confirmed",
        "Mon, 04 Mar 2024 09:12:00 +0000",
        "According to our policy, late arrivals must call ahead.\nConfirmation: AB12345",
    );
    let claimed = registry.parse_one(&inn, None).await;
    assert!(claimed.map_or(true, |record| record.provider != "hotel_chain"));
}
