//! Booking extractors: signal scoring, provider parsers, AI fallback and registry.

pub mod ai;
pub mod openai;
pub mod providers;
pub mod registry;
pub mod signals;
pub mod toolkit;

use async_trait::async_trait;
use thiserror::Error;
use tripsync_core::{BookingRecord, RawEmail};

pub use ai::{AiFallbackExtractor, TextModel, AI_CONFIDENCE_CAP};
pub use openai::OpenAiTextModel;
pub use providers::{
    AirbnbExtractor, AirlineExtractor, BookingComExtractor, HotelChainExtractor,
    RestaurantExtractor, VacationRentalExtractor,
};
pub use registry::{BatchProgress, ExtractorRegistry, ProgressFn};
pub use signals::{SignalDetector, SignalProfile};

pub const CRATE_NAME: &str = "tripsync-extractors";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Message(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("text model failed: {0}")]
    Model(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ExtractError {
    pub fn missing(field: &str) -> Self {
        ExtractError::Message(format!("missing required field: {field}"))
    }
}

/// One parser per provider or provider family.
///
/// `can_parse` must be cheap and side-effect free; `parse` is only called on
/// emails it claimed.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn provider_id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    /// Higher runs first.
    fn priority(&self) -> i32;

    fn can_parse(&self, email: &RawEmail) -> bool;

    async fn parse(&self, email: &RawEmail) -> Result<BookingRecord, ExtractError>;
}

/// The six provider extractors, built with their default patterns.
pub fn default_extractors() -> Result<Vec<Box<dyn Extractor>>, ExtractError> {
    Ok(vec![
        Box::new(AirbnbExtractor::new()?),
        Box::new(BookingComExtractor::new()?),
        Box::new(HotelChainExtractor::new()?),
        Box::new(AirlineExtractor::new()?),
        Box::new(RestaurantExtractor::new()?),
        Box::new(VacationRentalExtractor::new()?),
    ])
}
