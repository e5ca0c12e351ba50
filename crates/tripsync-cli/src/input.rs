use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tripsync_core::RawEmail;

/// JSON form of a local email; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmailFile {
    id: Option<String>,
    from: String,
    subject: String,
    date: String,
    body: String,
}

/// Read an email from disk: a JSON object, or a `From:`/`Subject:`/`Date:`
/// header block followed by a blank line and the body.
pub fn load_email(path: &Path) -> Result<RawEmail> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let fallback_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "local".to_string());

    let is_json = path.extension().is_some_and(|ext| ext == "json") || raw.trim_start().starts_with('{');
    if is_json {
        let file: EmailFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {} as JSON", path.display()))?;
        return Ok(RawEmail::new(
            file.id.unwrap_or(fallback_id),
            file.from,
            file.subject,
            file.date,
            file.body,
        ));
    }
    Ok(parse_email_text(&fallback_id, &raw))
}

pub fn parse_email_text(id: &str, text: &str) -> RawEmail {
    let mut from = String::new();
    let mut subject = String::new();
    let mut date = String::new();
    let mut body_start = 0;
    let mut saw_header = false;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            body_start += line.len();
            break;
        }
        let Some((name, value)) = trimmed.split_once(':') else {
            break;
        };
        let value = value.trim().to_string();
        match name.trim().to_ascii_lowercase().as_str() {
            "from" => from = value,
            "subject" => subject = value,
            "date" => date = value,
            "to" | "cc" | "reply-to" | "message-id" => {}
            _ => break,
        }
        saw_header = true;
        body_start += line.len();
    }

    let body = if saw_header { &text[body_start..] } else { text };
    RawEmail::new(id, from, subject, date, body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn header_block_then_body() {
        let email = parse_email_text(
            "x",
            "From: Airbnb <automated@airbnb.com>\nSubject: Reservation confirmed\nDate: Mon, 04 Mar 2024 09:12:00 +0000\n\nCheck-in: March 15, 2024\nTotal: $450.00",
        );
        assert_eq!(email.from, "Airbnb <automated@airbnb.com>");
        assert_eq!(email.subject, "Reservation confirmed");
        assert_eq!(email.date, "Mon, 04 Mar 2024 09:12:00 +0000");
        assert_eq!(email.body, "Check-in: March 15, 2024\nTotal: $450.00");
    }

    #[test]
    fn text_without_headers_is_all_body() {
        let email = parse_email_text("x", "Check-in: March 15\nsee you soon");
        assert!(email.from.is_empty());
        assert_eq!(email.body, "Check-in: March 15\nsee you soon");
    }

    #[test]
    fn json_file_uses_stem_as_default_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stay.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"from": "noreply@booking.com", "subject": "Booking confirmed"}}"#).unwrap();

        let email = load_email(&path).unwrap();
        assert_eq!(email.id, "stay");
        assert_eq!(email.from, "noreply@booking.com");
        assert!(email.body.is_empty());
    }
}
