//! Hashing, HTTP and mail-API plumbing for tripsync.

mod http;
pub mod mail;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use http::{is_retryable_status, ApiClient, ApiError, HttpClientConfig, RetryPolicy};
pub use mail::{GmailClient, MailApi, MailMessage, MessagePage, MessagePart, MessageRef};

pub const CRATE_NAME: &str = "tripsync-storage";

/// Hex characters kept from the SHA-256 digest.
pub const CONFIRMATION_HASH_LEN: usize = 16;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deduplication key for a booking. Not a security primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfirmationHash(String);

impl ConfirmationHash {
    /// Digest of the confirmation number, or of the email id when none was extracted.
    pub fn compute(confirmation_number: Option<&str>, email_id: &str) -> Self {
        let key = match confirmation_number.map(str::trim).filter(|c| !c.is_empty()) {
            Some(conf) => conf.to_ascii_uppercase(),
            None => email_id.trim().to_string(),
        };
        let mut digest = sha256_hex(key.as_bytes());
        digest.truncate(CONFIRMATION_HASH_LEN);
        Self(digest)
    }

    pub fn for_record(record: &tripsync_core::BookingRecord) -> Self {
        Self::compute(
            record.confirmation_number.as_deref(),
            &record.source_email_id,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
