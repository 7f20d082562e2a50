//! The single authenticated SMTP session a batch runs on.
//!
//! Acquire with [`SmtpSession::open`] and release with [`SmtpSession::close`].
//! A failed `open` releases whatever it had already acquired.

use std::time::Duration;

use mailwatch_common::{
    config::{SmtpParameters, TlsConfig, TlsPolicy, timings::DEFAULT_SMTP_TIMEOUT},
    internal,
};
use mailwatch_smtp::client::{Capabilities, ClientError, Response, SmtpClient};

use crate::{
    batch::Sent,
    error::{BatchFatalError, RecipientError},
    recipient::Recipient,
    template::MessageTemplate,
};

/// How a session is established, beyond the operator's credentials.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub helo_name: String,
    pub tls: TlsConfig,
    /// Applied to connecting and to every read and write.
    pub timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            helo_name: mailwatch_common::config::DEFAULT_HELO_NAME.to_string(),
            tls: TlsConfig::default(),
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }
}

pub struct SmtpSession {
    client: SmtpClient,
    server: String,
}

impl SmtpSession {
    /// Connects, upgrades with STARTTLS according to the TLS policy and
    /// authenticates.
    ///
    /// # Errors
    ///
    /// [`BatchFatalError::Unreachable`] or [`BatchFatalError::Timeout`] when the
    /// server cannot be reached, [`BatchFatalError::Authentication`] when the
    /// credentials are refused and [`BatchFatalError::Smtp`] for any other
    /// protocol failure.
    #[tracing::instrument(level = "debug", skip_all, fields(server = %smtp.address()))]
    pub async fn open(
        smtp: &SmtpParameters,
        settings: &SessionSettings,
    ) -> Result<Self, BatchFatalError> {
        let client = SmtpClient::connect(&smtp.host, smtp.port, settings.timeout)
            .await?
            .accept_invalid_certs(settings.tls.accept_invalid_certs());

        if settings.tls.accept_invalid_certs() {
            tracing::warn!(
                server = %smtp.address(),
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        let mut session = Self {
            client,
            server: smtp.address(),
        };

        match session.handshake(smtp, settings).await {
            Ok(()) => {
                internal!(level = DEBUG, server = %session.server, "Session established");
                Ok(session)
            }
            Err(err) => {
                session.close().await;
                Err(err)
            }
        }
    }

    async fn handshake(
        &mut self,
        smtp: &SmtpParameters,
        settings: &SessionSettings,
    ) -> Result<(), BatchFatalError> {
        let greeting = self.client.read_greeting().await?;
        if !greeting.is_success() {
            return Err(BatchFatalError::Smtp(format!(
                "Server rejected connection: {}",
                greeting.message()
            )));
        }

        let mut capabilities = self.ehlo(&settings.helo_name).await?;

        let wants_tls = match settings.tls.policy {
            TlsPolicy::Disabled => false,
            TlsPolicy::Opportunistic => capabilities.supports("STARTTLS"),
            TlsPolicy::Required => {
                if !capabilities.supports("STARTTLS") {
                    return Err(BatchFatalError::Smtp(
                        "STARTTLS extension not supported by server.".to_string(),
                    ));
                }
                true
            }
        };

        if wants_tls {
            let response = self.client.starttls().await?;
            if !response.is_success() {
                return Err(BatchFatalError::Smtp(format!(
                    "Server rejected STARTTLS: {}",
                    response.message()
                )));
            }
            // Capabilities must be fetched again on the encrypted channel
            capabilities = self.ehlo(&settings.helo_name).await?;
            tracing::debug!(server = %self.server, "TLS negotiated via STARTTLS");
        }

        self.authenticate(&capabilities, &smtp.username, &smtp.password)
            .await
    }

    async fn ehlo(&mut self, helo_name: &str) -> Result<Capabilities, BatchFatalError> {
        let response = self.client.ehlo(helo_name).await?;
        if !response.is_success() {
            return Err(BatchFatalError::Smtp(format!(
                "Server rejected EHLO: {}",
                response.message()
            )));
        }
        Ok(Capabilities::from_ehlo(&response))
    }

    /// Prefers `AUTH PLAIN`, falling back to `AUTH LOGIN`.
    async fn authenticate(
        &mut self,
        capabilities: &Capabilities,
        username: &str,
        password: &str,
    ) -> Result<(), BatchFatalError> {
        if !capabilities.supports("AUTH") {
            return Err(BatchFatalError::Smtp(
                "SMTP AUTH extension not supported by server.".to_string(),
            ));
        }

        let response = if capabilities.supports_auth("PLAIN") {
            self.client.auth_plain(username, password).await?
        } else if capabilities.supports_auth("LOGIN") {
            self.client.auth_login(username, password).await?
        } else {
            return Err(BatchFatalError::Smtp(
                "No suitable authentication method found.".to_string(),
            ));
        };

        if response.is_success() {
            Ok(())
        } else {
            Err(BatchFatalError::Authentication(format!(
                "{} {}",
                response.code,
                response.message()
            )))
        }
    }

    /// One complete transaction for one recipient.
    ///
    /// The inner result is the recipient's outcome: a refusal or a rejected
    /// message is a [`RecipientError::SendFailed`], followed by a best-effort
    /// `RSET` so the next transaction starts clean.
    ///
    /// # Errors
    ///
    /// A [`BatchFatalError`] when the connection was lost or timed out
    /// mid-transaction. The session cannot carry another recipient after that.
    #[tracing::instrument(level = "debug", skip_all, fields(recipient = %recipient))]
    pub async fn send(
        &mut self,
        template: &MessageTemplate,
        recipient: &Recipient,
    ) -> Result<Result<Sent, RecipientError>, BatchFatalError> {
        match self.transaction(template, recipient).await {
            Ok(response) => Ok(Ok(Sent {
                recipient: recipient.clone(),
                reply: response.message(),
            })),
            Err(ClientError::Timeout(after)) => {
                tracing::warn!(server = %self.server, %recipient, "Timed out mid-transaction");
                Err(BatchFatalError::Timeout(after))
            }
            Err(source) if source.is_connection_lost() => {
                tracing::warn!(server = %self.server, %recipient, error = %source, "Connection lost");
                Err(BatchFatalError::Smtp(format!(
                    "Connection lost while sending to {recipient}: {source}"
                )))
            }
            Err(source) => {
                let _ = self.client.rset().await;
                Ok(Err(RecipientError::SendFailed {
                    recipient: recipient.clone(),
                    source,
                }))
            }
        }
    }

    async fn transaction(
        &mut self,
        template: &MessageTemplate,
        recipient: &Recipient,
    ) -> Result<Response, ClientError> {
        expect_success(self.client.mail_from(template.sender()).await?)?;
        expect_success(self.client.rcpt_to(recipient.address()).await?)?;

        let response = self.client.data().await?;
        if !response.is_intermediate() {
            return Err(response.into_error());
        }

        expect_success(self.client.send_data(&template.compose(recipient)).await?)
    }

    /// Releases the session: QUIT, then drop the connection.
    pub async fn close(mut self) {
        if let Err(err) = self.client.quit().await {
            tracing::debug!(server = %self.server, error = %err, "QUIT failed while releasing session");
        }
    }
}

fn expect_success(response: Response) -> Result<Response, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(response.into_error())
    }
}
