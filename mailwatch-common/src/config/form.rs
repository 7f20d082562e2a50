//! The operator's form and its pre-flight validation.
//!
//! A [`Form`] holds what the operator typed, verbatim. Validation turns it into
//! a [`ValidatedForm`] or rejects it; a rejection never starts a batch.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Email content cannot be empty.")]
    EmptyBody,

    #[error("All SMTP settings must be filled.")]
    MissingSmtpField,

    #[error("Port must be a number.")]
    InvalidPort,
}

/// Raw form input.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Form {
    pub body: String,
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("body", &self.body)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

impl Form {
    /// Check the form the way a manual trigger does.
    ///
    /// The body must contain something other than whitespace, all four SMTP
    /// fields must be non-empty and the port must parse as a number.
    pub fn validate(&self) -> Result<ValidatedForm, ValidationError> {
        if self.body.trim().is_empty() {
            return Err(ValidationError::EmptyBody);
        }

        if [&self.host, &self.port, &self.username, &self.password]
            .iter()
            .any(|field| field.is_empty())
        {
            return Err(ValidationError::MissingSmtpField);
        }

        let port = self
            .port
            .trim()
            .parse::<u16>()
            .map_err(|_| ValidationError::InvalidPort)?;

        Ok(ValidatedForm {
            body: self.body.clone(),
            smtp: SmtpParameters {
                host: self.host.clone(),
                port,
                username: self.username.clone(),
                password: self.password.clone(),
            },
        })
    }
}

/// Connection parameters for one batch.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpParameters {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SmtpParameters {
    /// `host:port`, suitable for resolving.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for SmtpParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedForm {
    pub body: String,
    pub smtp: SmtpParameters,
}

fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}
