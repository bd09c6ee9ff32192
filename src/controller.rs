use std::sync::{Arc, LazyLock};

use tokio::sync::broadcast;

use crate::{
    config::Config,
    internal, logging,
    smtp::Listener,
    store::{MemoryMessageStore, MessageStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Resolve once the process is asked to stop (CTRL+C, or SIGTERM on Unix).
async fn shutdown() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => internal!("CTRL+C entered, shutting down"),
        () = terminate => internal!("SIGTERM received, shutting down"),
    }
}

/// Owns the configuration and runs the server until asked to stop.
pub struct Blackhole {
    config: Config,
    store: Option<Arc<dyn MessageStore>>,
}

impl Blackhole {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Use `store` instead of the in-memory store built from configuration.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn build_store(&self) -> Arc<dyn MessageStore> {
        self.store.clone().unwrap_or_else(|| {
            Arc::new(
                self.config
                    .store
                    .capacity
                    .map_or_else(MemoryMessageStore::new, MemoryMessageStore::with_capacity),
            )
        })
    }

    /// Run the server, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is invalid,
    /// the listener cannot be bound, or accepting connections fails.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        self.config.validate()?;
        internal!("Blackhole starting with {:?}", self.config.smtp);

        let store = self.build_store();
        let listener = Listener::bind(Arc::new(self.config.smtp.clone()), store).await?;

        let serving = listener.serve(SHUTDOWN_BROADCAST.subscribe());
        tokio::pin!(serving);

        tokio::select! {
            result = &mut serving => return result,
            () = shutdown() => {}
        }

        // Nobody may be subscribed if the listener already stopped.
        let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);
        serving.await?;

        internal!("Shut down");

        Ok(())
    }
}
