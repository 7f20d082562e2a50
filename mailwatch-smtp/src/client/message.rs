//! Plain-text message composition.

use std::fmt::Write;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Local};

/// Longest base64 line allowed by RFC 2045.
const BASE64_LINE_LENGTH: usize = 76;

/// Builder for a single-part `text/plain; charset=utf-8` message.
///
/// A body that is pure ASCII is sent as `7bit`; anything else is base64
/// encoded so the message never depends on the server offering `8BITMIME`.
///
/// # Examples
///
/// ```
/// use mailwatch_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .body("This is the message body")
///     .build();
///
/// assert!(message.contains("Subject: Hello\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    date: Option<DateTime<Local>>,
    message_id: Option<String>,
    body: String,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to = Some(email.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Overrides the `Date` header, which otherwise is the time of [`build`](Self::build).
    #[must_use]
    pub const fn date(mut self, date: DateTime<Local>) -> Self {
        self.date = Some(date);
        self
    }

    /// Overrides the generated `Message-ID`.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = content.into();
        self
    }

    /// Renders the message with CRLF line endings, ready for DATA.
    #[must_use]
    pub fn build(self) -> String {
        let mut message = String::with_capacity(512 + self.body.len() * 2);
        let date = self.date.unwrap_or_else(Local::now);
        let message_id = self
            .message_id
            .unwrap_or_else(|| generate_message_id(self.from.as_deref()));

        // Writing into a String cannot fail
        if let Some(from) = &self.from {
            let _ = write!(message, "From: {from}\r\n");
        }
        if let Some(to) = &self.to {
            let _ = write!(message, "To: {to}\r\n");
        }
        if let Some(subject) = &self.subject {
            let _ = write!(message, "Subject: {subject}\r\n");
        }
        let _ = write!(message, "Date: {}\r\n", date.to_rfc2822());
        let _ = write!(message, "Message-ID: {message_id}\r\n");
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");

        if self.body.is_ascii() {
            message.push_str("Content-Transfer-Encoding: 7bit\r\n\r\n");
            message.push_str(&normalise_line_endings(&self.body));
        } else {
            message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
            message.push_str(&base64_wrapped(self.body.as_bytes()));
        }

        message
    }
}

/// `<ulid@domain>`, taking the domain from the sender when there is one.
fn generate_message_id(from: Option<&str>) -> String {
    let domain = from
        .and_then(|from| from.rsplit_once('@'))
        .map_or("localhost", |(_, domain)| domain);

    format!("<{}@{domain}>", ulid::Ulid::new())
}

/// Converts bare `\n` (and stray `\r`) into `\r\n`.
fn normalise_line_endings(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + body.len() / 16);
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            c => out.push(c),
        }
    }

    out
}

fn base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2 + 2);

    // base64 output is ASCII, so byte chunks are valid str slices
    for chunk in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }

    out
}
