//! SMTP submission client with STARTTLS and AUTH support.
//!
//! Every network operation (resolving, connecting, the TLS handshake, and
//! each read or write) is bounded by the timeout given to
//! [`SmtpClient::connect`]. A read or write that times out or fails drops the
//! connection: a late reply would otherwise be matched to the next command.

use std::{future::Future, io, sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use mailwatch_common::{incoming, outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await,
            Self::Tls(stream) => stream.write_all(data).await,
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf).await,
            Self::Tls(stream) => stream.read(buf).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.shutdown().await,
            Self::Tls(stream) => stream.shutdown().await,
        }
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            root_store
                .add(cert)
                .map_err(|e| ClientError::TlsError(format!("Failed to add certificate: {e}")))?;
        }
        // Some unreadable system certificates are not fatal
        if !certs.errors.is_empty() {
            tracing::warn!(?certs.errors, "Some certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain: {e}")))?;

        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// A certificate verifier that accepts all certificates.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// A client for one SMTP session.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
    timeout: Duration,
}

impl SmtpClient {
    /// Resolves `host` and connects to the first address that accepts.
    ///
    /// # Errors
    ///
    /// [`ClientError::Resolve`] if the name does not resolve,
    /// [`ClientError::Connect`] if no address accepts the connection and
    /// [`ClientError::Timeout`] if resolving or connecting took too long.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = format!("{host}:{port}");

        let addrs: Vec<_> = bounded(timeout, tokio::net::lookup_host((host, port)))
            .await?
            .map_err(|source| ClientError::Resolve {
                address: address.clone(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ClientError::Resolve {
                address,
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            });
        }

        let mut last_error = None;
        for addr in addrs {
            match bounded(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    tracing::debug!(%address, %addr, "Connected");
                    return Ok(Self {
                        connection: Some(ClientConnection::Plain(stream)),
                        buffer: vec![0u8; BUFFER_SIZE],
                        buffer_pos: 0,
                        server_domain: host.to_string(),
                        accept_invalid_certs: false,
                        timeout,
                    });
                }
                Ok(Err(source)) => last_error = Some(ClientError::Connect {
                    address: address.clone(),
                    source,
                }),
                Err(timed_out) => last_error = Some(timed_out),
            }
        }

        Err(last_error.unwrap_or(ClientError::ConnectionClosed))
    }

    /// Sets whether to accept invalid TLS certificates after STARTTLS.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Reads the initial server greeting (220 response).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is invalid.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a raw command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.write_line(command).await?;
        self.read_response().await
    }

    /// Like [`command`](Self::command), but keeps `line` out of the trace.
    async fn secret_command(&mut self, line: &str, shown_as: &str) -> Result<Response> {
        outgoing!("{shown_as}");
        self.write_line(line).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// Sends STARTTLS and, if the server agrees, upgrades the connection.
    ///
    /// The reply is returned as-is when the server refuses; the connection is
    /// then still plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;
            let upgraded = bounded(
                self.timeout,
                connection.upgrade_to_tls(&self.server_domain, self.accept_invalid_certs),
            )
            .await??;
            self.connection = Some(upgraded);
            // Anything buffered before the handshake must not be trusted
            self.buffer_pos = 0;
        }

        Ok(response)
    }

    /// `AUTH PLAIN` with an initial response (RFC 4616).
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails at the transport level.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        self.secret_command(&format!("AUTH PLAIN {token}"), "AUTH PLAIN <credentials>")
            .await
    }

    /// `AUTH LOGIN`. Returns the first reply that is not a 334 challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails at the transport level.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<Response> {
        let response = self.command("AUTH LOGIN").await?;
        if response.code != 334 {
            return Ok(response);
        }

        let response = self
            .secret_command(&STANDARD.encode(username), "<username>")
            .await?;
        if response.code != 334 {
            return Ok(response);
        }

        self.secret_command(&STANDARD.encode(password), "<password>")
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content, dot-stuffed and terminated by `<CRLF>.<CRLF>`.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let mut payload = dot_stuff(data);
        if !payload.ends_with("\r\n") {
            payload.push_str("\r\n");
        }
        payload.push_str(".\r\n");

        outgoing!("<{} bytes of message data>", payload.len());
        self.write(payload.as_bytes()).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rset(&mut self) -> Result<Response> {
        self.command("RSET").await
    }

    /// Sends QUIT and closes the connection, whatever the server answers.
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT could not be exchanged; the connection is
    /// dropped either way.
    pub async fn quit(&mut self) -> Result<Response> {
        let response = self.command("QUIT").await;

        if let Some(mut connection) = self.connection.take() {
            let _ = bounded(self.timeout, connection.shutdown()).await;
        }

        response
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        // One command per line; anything else would smuggle in a second one
        if line.contains(['\r', '\n']) {
            return Err(ClientError::LineBreak);
        }
        self.write(format!("{line}\r\n").as_bytes()).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.timeout;
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        let written = flatten(bounded(timeout, connection.send(data)).await);
        if written.is_err() {
            self.connection = None;
        }
        written
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let timeout = self.timeout;
            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let read = flatten(
                bounded(timeout, connection.read(&mut self.buffer[self.buffer_pos..])).await,
            );
            let n = match read {
                Ok(n) => n,
                Err(err) => {
                    self.connection = None;
                    return Err(err);
                }
            };
            if n == 0 {
                self.connection = None;
                return Err(ClientError::ConnectionClosed);
            }
            self.buffer_pos += n;
        }
    }
}

/// Runs `future`, failing with [`ClientError::Timeout`] once `timeout` elapses.
async fn bounded<F: Future>(timeout: Duration, future: F) -> Result<F::Output> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ClientError::Timeout(timeout))
}

fn flatten<T>(result: Result<io::Result<T>>) -> Result<T> {
    result.and_then(|inner| inner.map_err(ClientError::from))
}

/// Doubles every leading `.` on a line (RFC 5321 §4.5.2).
fn dot_stuff(data: &str) -> String {
    let mut out = String::with_capacity(data.len() + 16);
    if data.starts_with('.') {
        out.push('.');
    }
    out.push_str(&data.replace("\n.", "\n.."));
    out
}
