//! Mail retrieval capability and the Gmail REST implementation.
//!
//! The sync engine only depends on [`MailApi`]: a paginated search returning
//! message ids plus a fetch-by-id returning headers and a (possibly multipart)
//! base64url body. Anything speaking that shape can stand in for Gmail.

use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use tripsync_core::RawEmail;

use crate::http::{ApiClient, ApiError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// Plain-text leaf builder, mostly for tests and fakes.
    pub fn text(mime_type: &str, content: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            headers: Vec::new(),
            body: Some(PartBody {
                data: Some(URL_SAFE_NO_PAD.encode(content.as_bytes())),
                size: content.len() as u64,
            }),
            parts: Vec::new(),
        }
    }

    fn find_first(&self, mime: &str) -> Option<&MessagePart> {
        if self.mime_type.eq_ignore_ascii_case(mime)
            && self.body.as_ref().and_then(|b| b.data.as_ref()).is_some()
        {
            return Some(self);
        }
        self.parts.iter().find_map(|p| p.find_first(mime))
    }

    fn decoded(&self) -> Result<String, ApiError> {
        match self.body.as_ref().and_then(|b| b.data.as_deref()) {
            Some(data) => decode_base64url(data),
            None => Ok(String::new()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: MessagePart,
}

impl MailMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Provider timestamp (milliseconds since epoch).
    pub fn internal_timestamp(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.internal_date.as_deref()?.trim().parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Message text: the first `text/plain` part, else the first `text/html` part with tags stripped.
    pub fn decoded_body(&self) -> Result<String, ApiError> {
        if let Some(plain) = self.payload.find_first("text/plain") {
            return plain.decoded();
        }
        if let Some(html) = self.payload.find_first("text/html") {
            return Ok(strip_html(&html.decoded()?));
        }
        let raw = self.payload.decoded()?;
        if raw.contains('<') && raw.contains('>') {
            Ok(strip_html(&raw))
        } else {
            Ok(raw)
        }
    }

    pub fn to_raw_email(&self) -> Result<RawEmail, ApiError> {
        let date = self
            .header("Date")
            .map(ToString::to_string)
            .or_else(|| self.internal_timestamp().map(|ts| ts.to_rfc2822()))
            .unwrap_or_default();
        Ok(RawEmail::new(
            self.id.clone(),
            self.header("From").unwrap_or_default(),
            self.header("Subject").unwrap_or_default(),
            date,
            self.decoded_body()?,
        ))
    }
}

pub fn decode_base64url(data: &str) -> Result<String, ApiError> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = URL_SAFE_NO_PAD
        .decode(cleaned.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(&cleaned))
        .map_err(|e| ApiError::Decode(format!("invalid base64url body: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

const BLOCK_TAGS: &[&str] = &[
    "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "td", "th",
];

/// Visible text of an HTML document, one line per block element.
pub fn strip_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => out.push('\n'),
            Node::Text(text) => {
                let hidden = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .map(|e| matches!(e.name(), "script" | "style" | "head"))
                        .unwrap_or(false)
                });
                if !hidden {
                    out.push_str(text);
                    if !text.ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                }
            }
            _ => {}
        }
    }

    out.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
pub trait MailApi: Send + Sync {
    async fn list_messages(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage, ApiError>;

    async fn get_message(&self, id: &str) -> Result<MailMessage, ApiError>;
}

/// Gmail REST (`users.messages.list` / `users.messages.get`).
#[derive(Debug, Clone)]
pub struct GmailClient {
    api: ApiClient,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(api: ApiClient, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl MailApi for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage, ApiError> {
        let url = format!("{}/messages", self.base_url);
        let mut params = vec![("q", query.to_string()), ("maxResults", page_size.to_string())];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        self.api
            .get_json(&url, Some(self.access_token.as_str()), &params)
            .await
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, ApiError> {
        let url = format!("{}/messages/{}", self.base_url, id);
        self.api
            .get_json(&url, Some(self.access_token.as_str()), &[("format", "full".to_string())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn multipart(parts: Vec<MessagePart>) -> MailMessage {
        MailMessage {
            id: "m1".into(),
            internal_date: Some("1710000000000".into()),
            payload: MessagePart {
                mime_type: "multipart/alternative".into(),
                headers: vec![
                    header("From", "Hilton <reservations@hilton.com>"),
                    header("subject", "Your stay is confirmed"),
                ],
                body: None,
                parts,
            },
        }
    }

    #[test]
    fn prefers_plain_text_part() {
        let msg = multipart(vec![
            MessagePart::text("text/html", "<p>html version</p>"),
            MessagePart::text("text/plain", "plain version"),
        ]);
        assert_eq!(msg.decoded_body().unwrap(), "plain version");
    }

    #[test]
    fn falls_back_to_stripped_html() {
        let msg = multipart(vec![MessagePart::text(
            "text/html",
            "<html><head><style>p{}</style></head><body><p>Check-in: <b>March 15, 2024</b></p><div>Total: $450.00</div><script>x()</script></body></html>",
        )]);
        let body = msg.decoded_body().unwrap();
        assert!(body.contains("Check-in: March 15, 2024"));
        assert!(body.contains("Total: $450.00"));
        assert!(!body.contains("x()"));
        assert!(!body.contains("p{}"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let msg = multipart(vec![]);
        assert_eq!(msg.header("SUBJECT"), Some("Your stay is confirmed"));
        assert_eq!(msg.header("Date"), None);
    }

    #[test]
    fn raw_email_uses_internal_date_without_date_header() {
        let msg = multipart(vec![MessagePart::text("text/plain", "hi")]);
        let email = msg.to_raw_email().unwrap();
        assert_eq!(email.id, "m1");
        assert_eq!(email.from, "Hilton <reservations@hilton.com>");
        assert!(email.date.contains("2024"));
        assert_eq!(email.body, "hi");
    }

    #[test]
    fn decodes_padded_and_unpadded_base64url() {
        assert_eq!(decode_base64url("aGk").unwrap(), "hi");
        assert_eq!(decode_base64url("aGk=").unwrap(), "hi");
        assert!(decode_base64url("!!!").is_err());
    }

    #[test]
    fn gmail_page_deserializes_without_messages() {
        let page: MessagePage = serde_json::from_str(r#"{"resultSizeEstimate":0}"#).unwrap();
        assert!(page.messages.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
