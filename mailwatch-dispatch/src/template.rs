use mailwatch_common::SUBJECT;
use mailwatch_smtp::client::MessageBuilder;

use crate::recipient::Recipient;

/// What every recipient of a batch receives. Built once per batch from the
/// form, never changed while the batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    sender: String,
    subject: String,
    body: String,
}

impl MessageTemplate {
    /// A template with the fixed subject line.
    #[must_use]
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            subject: SUBJECT.to_string(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Renders the message for one recipient.
    #[must_use]
    pub fn compose(&self, recipient: &Recipient) -> String {
        MessageBuilder::new()
            .from(&self.sender)
            .to(recipient.address())
            .subject(&self.subject)
            .body(&self.body)
            .build()
    }
}
