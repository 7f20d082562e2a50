//! SMTP submission client.
//!
//! This module provides the small client mailwatch needs to hand messages to
//! a submission server. It supports:
//!
//! - Plain TCP connections upgraded with STARTTLS
//! - `AUTH PLAIN` and `AUTH LOGIN`
//! - One transaction after another on the same session
//! - A single timeout applied to every network operation
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use mailwatch_smtp::client::{Capabilities, MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("smtp.example.com", 587, Duration::from_secs(10)).await?;
//! client.read_greeting().await?;
//! client.ehlo("localhost").await?;
//! client.starttls().await?;
//! let ehlo = client.ehlo("localhost").await?;
//! assert!(Capabilities::from_ehlo(&ehlo).supports_auth("PLAIN"));
//! client.auth_plain("me@example.com", "secret").await?;
//!
//! let message = MessageBuilder::new()
//!     .from("me@example.com")
//!     .to("you@example.org")
//!     .subject("Hello")
//!     .body("Hello World")
//!     .build();
//!
//! client.mail_from("me@example.com").await?;
//! client.rcpt_to("you@example.org").await?;
//! client.data().await?;
//! client.send_data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::MessageBuilder;
pub use response::{Capabilities, Response, ResponseLine};
pub use smtp_client::SmtpClient;
