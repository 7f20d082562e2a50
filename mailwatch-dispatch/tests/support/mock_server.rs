//! Mock submission server for batch tests
//!
//! This module provides a configurable mock SMTP server that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Advertise AUTH mechanisms and accept or refuse credentials
//! - Refuse individual recipients at RCPT TO
//! - Hang after a given number of commands to exercise timeouts
//! - Answer the end of DATA late, or drop the connection mid-session
//! - Track received commands and delivered messages for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_auth_response(535, "5.7.8 Authentication credentials invalid")
//!     .build()
//!     .await?;
//!
//! // Point a batch at server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO command with hostname
    Ehlo(String),
    /// `AUTH PLAIN` with decoded `(username, password)`
    AuthPlain(String, String),
    /// `AUTH LOGIN` with decoded `(username, password)`
    AuthLogin(String, String),
    /// MAIL FROM reverse path, without the angle brackets
    MailFrom(String),
    /// RCPT TO forward path, without the angle brackets
    RcptTo(String),
    /// DATA command
    Data,
    /// Message content (after DATA), still dot-stuffed
    MessageContent(Vec<u8>),
    /// RSET command
    Rset,
    /// QUIT command
    Quit,
    /// STARTTLS command
    StartTls,
    /// Unknown/other command
    Other(String),
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// SMTP status code (e.g., 250, 550)
    pub code: u16,
    /// Response message
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    capabilities: Vec<String>,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    rejected_recipients: HashMap<String, SmtpResponse>,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    starttls_response: SmtpResponse,

    // Failure injection
    hang_on_command: Option<usize>,
    disconnect_on_command: Option<usize>,
    data_end_delay: Option<Duration>,
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "250{separator}{capability}\r\n");
        }

        response.into_bytes()
    }
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            capabilities: vec![
                "localhost".to_string(),
                "SIZE 10000000".to_string(),
                "AUTH PLAIN LOGIN".to_string(),
            ],
            auth_response: SmtpResponse::new(235, "2.7.0 Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            rejected_recipients: HashMap::new(),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            starttls_response: SmtpResponse::new(502, "Command not implemented"),
            hang_on_command: None,
            disconnect_on_command: None,
            data_end_delay: None,
        }
    }
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    /// Create a new builder for configuring the mock server
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    /// Get the address the server is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get all commands received by the server, across connections
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Recipients whose message content was accepted, in order
    pub async fn delivered(&self) -> Vec<String> {
        let commands = self.commands().await;
        let mut delivered = Vec::new();
        let mut pending = None;

        for command in commands {
            match command {
                SmtpCommand::RcptTo(to) => pending = Some(to),
                SmtpCommand::MessageContent(_) => delivered.extend(pending.take()),
                SmtpCommand::Rset => pending = None,
                _ => {}
            }
        }

        delivered
    }

    /// Message contents received, in order
    pub async fn messages(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => {
                    Some(String::from_utf8_lossy(&content).into_owned())
                }
                _ => None,
            })
            .collect()
    }

    /// Number of times `command` was received
    pub async fn count(&self, command: &SmtpCommand) -> usize {
        self.commands_received
            .read()
            .await
            .iter()
            .filter(|received| *received == command)
            .count()
    }

    /// Number of commands matching `predicate`
    pub async fn count_matching(&self, predicate: impl Fn(&SmtpCommand) -> bool) -> usize {
        self.commands_received
            .read()
            .await
            .iter()
            .filter(|received| predicate(received))
            .count()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Handle a single client connection
    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut local_command_count = 0;

        if config.hang_on_command == Some(0) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            let read_result = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;
            let Ok(bytes_read) = read_result else {
                return Ok(());
            };
            if bytes_read? == 0 {
                // Connection closed
                return Ok(());
            }

            local_command_count += 1;

            // Hang before answering the Nth command (1-indexed)
            if config.hang_on_command == Some(local_command_count) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            // Close the connection instead of answering the Nth command
            if config.disconnect_on_command == Some(local_command_count) {
                return Ok(());
            }

            let cmd_line = line.trim_end().to_string();
            tracing::debug!("Mock server received: {}", cmd_line);

            let (verb, argument) = cmd_line
                .split_once(' ')
                .unwrap_or((cmd_line.as_str(), ""));

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "EHLO" => (config.ehlo_bytes(), SmtpCommand::Ehlo(argument.to_string())),
                "AUTH" => {
                    let (mechanism, initial) = argument
                        .split_once(' ')
                        .unwrap_or((argument, ""));

                    let cmd = match mechanism.to_uppercase().as_str() {
                        "PLAIN" => {
                            let decoded = decode(initial);
                            let mut parts = decoded.split('\0').skip(1);
                            SmtpCommand::AuthPlain(
                                parts.next().unwrap_or_default().to_string(),
                                parts.next().unwrap_or_default().to_string(),
                            )
                        }
                        "LOGIN" => {
                            let username =
                                Self::challenge(&mut reader, &mut writer, "VXNlcm5hbWU6").await?;
                            let password =
                                Self::challenge(&mut reader, &mut writer, "UGFzc3dvcmQ6").await?;
                            SmtpCommand::AuthLogin(username, password)
                        }
                        _ => SmtpCommand::Other(cmd_line.clone()),
                    };
                    (config.auth_response.to_bytes(), cmd)
                }
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(path(argument)),
                ),
                "RCPT" => {
                    let to = path(argument);
                    let response = config
                        .rejected_recipients
                        .get(&to)
                        .unwrap_or(&config.rcpt_to_response)
                        .to_bytes();
                    (response, SmtpCommand::RcptTo(to))
                }
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "RSET" => (SmtpResponse::new(250, "OK").to_bytes(), SmtpCommand::Rset),
                "STARTTLS" => (config.starttls_response.to_bytes(), SmtpCommand::StartTls),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer
                        .write_all(&SmtpResponse::new(221, "Bye").to_bytes())
                        .await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.clone()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());
            writer.write_all(&response).await?;
            writer.flush().await?;

            // Read message content until we see <CRLF>.<CRLF>
            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut message_content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(());
                    }

                    if data_line == ".\r\n" {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content));
                        if let Some(delay) = config.data_end_delay {
                            tokio::time::sleep(delay).await;
                        }
                        writer
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        writer.flush().await?;
                        break;
                    }

                    message_content.extend_from_slice(data_line.as_bytes());
                }
            }
        }
    }

    /// One `AUTH LOGIN` round: send a 334 challenge and decode the answer.
    async fn challenge<R, W>(
        reader: &mut R,
        writer: &mut W,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>
    where
        R: AsyncBufReadExt + Unpin,
        W: AsyncWriteExt + Unpin,
    {
        writer.write_all(format!("334 {prompt}\r\n").as_bytes()).await?;
        writer.flush().await?;

        let mut answer = String::new();
        reader.read_line(&mut answer).await?;
        Ok(decode(answer.trim_end()))
    }
}

fn decode(encoded: &str) -> String {
    STANDARD
        .decode(encoded)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// `FROM:<a@b.c> SIZE=10` -> `a@b.c`
fn path(argument: &str) -> String {
    argument
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or_else(String::new, |(path, _)| path.to_string())
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Replace the EHLO capability lines (the first line is the server name)
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    /// Set the final reply to AUTH
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the MAIL FROM response
    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response for every recipient
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Refuse one recipient at RCPT TO
    #[must_use]
    pub fn rejecting(mut self, address: &str, code: u16, message: impl Into<String>) -> Self {
        self.config
            .rejected_recipients
            .insert(address.to_string(), SmtpResponse::new(code, message));
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the STARTTLS response
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = SmtpResponse::new(code, message);
        self
    }

    /// Hang instead of answering the Nth command; 0 hangs before the greeting
    #[must_use]
    pub const fn with_hang_on_command(mut self, command_index: usize) -> Self {
        self.config.hang_on_command = Some(command_index);
        self
    }

    /// Drop the connection instead of answering the Nth command (1-indexed)
    #[must_use]
    pub const fn with_disconnect_on_command(mut self, command_index: usize) -> Self {
        self.config.disconnect_on_command = Some(command_index);
        self
    }

    /// Wait `delay` before answering the end of every message
    #[must_use]
    pub const fn with_data_end_delay(mut self, delay: Duration) -> Self {
        self.config.data_end_delay = Some(delay);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        // Bind to a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
        })
    }
}
