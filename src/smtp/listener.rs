use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use futures_util::future::join_all;
use tokio::{net::TcpListener, sync::broadcast};

use super::{
    connection,
    session::{Session, SessionConfig},
};
use crate::{
    config::SmtpConfig,
    controller::Signal,
    internal,
    store::MessageStore,
};

/// Pause before accepting again after a failure that is not tied to one peer,
/// such as running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long to wait after `accept` fails. Failures caused by a single peer
/// giving up are retried immediately.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

/// Accepts connections and runs one [`Session`] task per peer.
pub struct Listener {
    listener: TcpListener,
    session: SessionConfig,
}

impl Listener {
    /// Bind the configured address and prepare the shared session state.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or the TLS material cannot be
    /// loaded.
    pub async fn bind(config: Arc<SmtpConfig>, store: Arc<dyn MessageStore>) -> anyhow::Result<Self> {
        let tls = if config.tls.is_enabled() {
            Some(connection::tls_acceptor(&config.tls)?)
        } else {
            None
        };

        if config.auth.required && tls.is_none() && !config.allow_insecure_auth {
            tracing::warn!(
                "Authentication is required but AUTH is never offered without TLS; every transaction will be refused"
            );
        }

        let listener = TcpListener::bind(config.listen).await?;

        internal!(
            level = INFO,
            "SMTP listener bound to {} (TLS {})",
            listener.local_addr()?,
            if tls.is_some() { "available" } else { "disabled" }
        );

        let session = SessionConfig::builder(store)
            .with_smtp(config)
            .with_tls(tls)
            .build();

        Ok(Self { listener, session })
    }

    /// The address actually bound, useful when the configured port is `0`.
    ///
    /// # Errors
    ///
    /// Propagates the socket error if the address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires, then wait for every open
    /// session to finish.
    ///
    /// Every session listens on the same channel, so one signal also closes
    /// idle connections with `421`. A failed `accept` is logged and the loop
    /// carries on; it never ends the sessions already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the bound address cannot be read.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        let mut sessions = Vec::default();
        let address = self.local_addr()?;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    internal!(
                        level = INFO,
                        "SMTP listener {address} received shutdown signal, finishing {} sessions ...",
                        sessions.len()
                    );
                    join_all(sessions).await;
                    break;
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::warn!(%address, %err, "Failed to accept connection");
                            if let Some(delay) = accept_backoff(&err) {
                                tokio::time::sleep(delay).await;
                            }
                            continue;
                        }
                    };
                    tracing::debug!(%peer, "Connection received");

                    let session = Session::create(stream, peer, self.session.clone());
                    let signal = shutdown.resubscribe();

                    sessions.push(tokio::spawn(async move {
                        match session.run(signal).await {
                            Ok(()) => {}
                            Err(err) if err.is_client_error() => {
                                tracing::debug!(%peer, %err, "Session ended by client");
                            }
                            Err(err) => tracing::error!(%peer, %err, "Session failed"),
                        }
                    }));

                    sessions.retain(|handle| !handle.is_finished());
                }
            }
        }

        Ok(())
    }
}
