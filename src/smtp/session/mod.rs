use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast,
};
use tokio_rustls::TlsAcceptor;

use super::{
    auth::{Authenticator, Negotiator, StaticCredentials},
    connection::{Connection, Line},
    envelope::{Envelope, Policy},
    status::{Reply, Status},
};
use crate::{
    config::SmtpConfig, controller::Signal, error::SessionError, internal, outgoing,
    store::MessageStore,
};

mod data;
mod handlers;

/// What the run loop does after a command has been answered.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Flow {
    Continue,
    Close,
    StartTls,
}

/// Everything a session needs that is shared with every other session.
#[derive(Clone)]
pub struct SessionConfig {
    pub smtp: Arc<SmtpConfig>,
    pub tls: Option<TlsAcceptor>,
    pub negotiator: Negotiator,
    pub store: Arc<dyn MessageStore>,
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder(store: Arc<dyn MessageStore>) -> SessionConfigBuilder {
        SessionConfigBuilder {
            smtp: Arc::default(),
            tls: None,
            authenticator: None,
            store,
        }
    }
}

/// Builder for `SessionConfig`
pub struct SessionConfigBuilder {
    smtp: Arc<SmtpConfig>,
    tls: Option<TlsAcceptor>,
    authenticator: Option<Arc<dyn Authenticator>>,
    store: Arc<dyn MessageStore>,
}

impl SessionConfigBuilder {
    /// Set the protocol configuration
    #[must_use]
    pub fn with_smtp(mut self, smtp: Arc<SmtpConfig>) -> Self {
        self.smtp = smtp;
        self
    }

    /// Set the acceptor used for STARTTLS
    #[must_use]
    pub fn with_tls(mut self, tls: Option<TlsAcceptor>) -> Self {
        self.tls = tls;
        self
    }

    /// Replace the credential check. Defaults to the configured static pair.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Build the final `SessionConfig`
    #[must_use]
    pub fn build(self) -> SessionConfig {
        let authenticator = self
            .authenticator
            .unwrap_or_else(|| Arc::new(StaticCredentials::from(&self.smtp.auth)));

        SessionConfig {
            negotiator: Negotiator::new(authenticator),
            smtp: self.smtp,
            tls: self.tls,
            store: self.store,
        }
    }
}

/// One SMTP conversation, owned by the task serving its connection.
pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    peer: SocketAddr,
    config: Arc<SmtpConfig>,
    connection: Connection<Stream>,
    tls: Option<TlsAcceptor>,
    negotiator: Negotiator,
    store: Arc<dyn MessageStore>,
    envelope: Envelope,
    greeted: bool,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn create(stream: Stream, peer: SocketAddr, config: SessionConfig) -> Self {
        let envelope = Envelope::new(Policy {
            auth_required: config.smtp.auth.required,
            max_recipients: config.smtp.max_recipients,
        });

        Self {
            peer,
            connection: Connection::new(stream),
            config: config.smtp,
            tls: config.tls,
            negotiator: config.negotiator,
            store: config.store,
            envelope,
            greeted: false,
        }
    }

    /// Serve the connection until the peer quits, the transport fails, or a
    /// shutdown is signalled.
    ///
    /// The shutdown signal is only observed while waiting for the next
    /// command, so a command in progress (including its store write) always
    /// completes first.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] that ended the session.
    pub async fn run(mut self, mut signal: broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        internal!(level = DEBUG, "Connected to {}", self.peer);

        let banner = self.config.banner();
        let result = match self.reply(Reply::new(Status::ServiceReady, banner)).await {
            Err(err) => Err(err),
            Ok(()) => loop {
                let line = tokio::select! {
                    _ = signal.recv() => {
                        internal!(level = DEBUG, "Shutdown requested, closing {}", self.peer);
                        let _ = self
                            .reply(Reply::with_code(
                                Status::Unavailable,
                                "4.3.2",
                                "Server shutting down",
                            ))
                            .await;
                        break Ok(());
                    }
                    line = self.read_line() => line,
                };

                let flow = match line {
                    Ok(Some(Line::Complete(bytes))) => self.dispatch(&bytes).await,
                    Ok(Some(Line::TooLong)) => self.line_too_long().await,
                    Ok(None) => Ok(Flow::Close),
                    Err(err) => Err(err),
                };

                match flow {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Close) => break Ok(()),
                    Ok(Flow::StartTls) => {
                        let Some(acceptor) = self.tls.clone() else {
                            continue;
                        };

                        match self.connection.upgrade(&acceptor).await {
                            Ok((connection, info)) => {
                                internal!(
                                    level = DEBUG,
                                    "Connection with {} upgraded ({}, {})",
                                    self.peer,
                                    info.proto(),
                                    info.cipher()
                                );
                                self.connection = connection;
                            }
                            Err(err) => break Err(err.into()),
                        }
                    }
                    Err(err) => break Err(err),
                }
            },
        };

        internal!(level = DEBUG, "Connection with {} closed", self.peer);

        result
    }

    async fn reply(&mut self, reply: Reply) -> Result<(), SessionError> {
        outgoing!("{reply}");

        let timeout = self.config.timeouts.write();
        match tokio::time::timeout(timeout, self.connection.send(&reply)).await {
            Ok(sent) => sent.map(|_| ()).map_err(SessionError::from),
            Err(_) => Err(SessionError::Timeout(self.config.timeouts.write_secs)),
        }
    }

    /// Read one line, answering `421` if the peer stays silent too long.
    async fn read_line(&mut self) -> Result<Option<Line>, SessionError> {
        let limit = self.config.max_line_length;
        let timeout = self.config.timeouts.read();

        match tokio::time::timeout(timeout, self.connection.read_line(limit)).await {
            Ok(line) => Ok(line?),
            Err(_) => {
                let timeout_secs = self.config.timeouts.read_secs;
                tracing::warn!(
                    peer = ?self.peer,
                    timeout_secs,
                    "Client connection timed out"
                );

                let _ = self
                    .reply(Reply::with_code(
                        Status::Unavailable,
                        "4.4.2",
                        format!("{} Error: timeout exceeded", self.config.domain),
                    ))
                    .await;

                Err(SessionError::Timeout(timeout_secs))
            }
        }
    }

    async fn line_too_long(&mut self) -> Result<Flow, SessionError> {
        self.reply(Reply::with_code(
            Status::SyntaxError,
            "5.4.0",
            "Error: line too long",
        ))
        .await?;

        Err(SessionError::LineTooLong(self.config.max_line_length))
    }
}
