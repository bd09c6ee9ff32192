//! End-to-end test harness for the blackhole server
//!
//! Starts a listener on an ephemeral loopback port backed by an in-memory
//! store, so tests can talk real SMTP and then inspect what was kept.
//!
//! ```no_run
//! let harness = TestHarness::builder().with_auth("user", "pass").build().await.unwrap();
//! let (mut client, _greeting) = harness.connect().await.unwrap();
//! harness.shutdown().await;
//! ```

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use blackhole::{
    config::{AuthConfig, SmtpConfig, Timeouts, TlsConfig},
    smtp::Listener,
    store::{MemoryMessageStore, MessageStore},
    Signal,
};
use tokio::{sync::broadcast, task::JoinHandle, time::timeout};

use super::client::{Client, Response};

pub struct TestHarness {
    addr: SocketAddr,
    store: Arc<MemoryMessageStore>,
    handle: JoinHandle<anyhow::Result<()>>,
    shutdown_tx: broadcast::Sender<Signal>,
}

impl TestHarness {
    #[must_use]
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn connect(&self) -> anyhow::Result<(Client, Response)> {
        Client::connect(self.addr).await
    }

    #[must_use]
    pub fn store(&self) -> Arc<MemoryMessageStore> {
        self.store.clone()
    }

    /// Signal shutdown and wait for the listener to drain its sessions.
    ///
    /// # Panics
    ///
    /// Panics if the listener does not stop within 5 seconds or failed.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(Signal::Shutdown);

        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("listener did not stop in time")
            .expect("listener task panicked")
            .expect("listener failed");
    }
}

pub struct TestHarnessBuilder {
    config: SmtpConfig,
    capacity: Option<usize>,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            config: SmtpConfig {
                listen: SocketAddr::from(([127, 0, 0, 1], 0)),
                domain: String::from("blackhole.test"),
                timeouts: Timeouts {
                    read_secs: 5,
                    write_secs: 5,
                },
                ..SmtpConfig::default()
            },
            capacity: None,
        }
    }
}

#[allow(dead_code)]
impl TestHarnessBuilder {
    #[must_use]
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.config.auth = AuthConfig {
            required: true,
            username: username.to_string(),
            password: password.to_string(),
        };
        self
    }

    #[must_use]
    pub fn with_insecure_auth(mut self, allowed: bool) -> Self {
        self.config.allow_insecure_auth = allowed;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, certificate: PathBuf, key: PathBuf) -> Self {
        self.config.tls = TlsConfig {
            enabled: true,
            certificate,
            key,
        };
        self
    }

    #[must_use]
    pub fn with_max_recipients(mut self, max: usize) -> Self {
        self.config.max_recipients = max;
        self
    }

    #[must_use]
    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.config.max_message_bytes = max;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, secs: u64) -> Self {
        self.config.timeouts.read_secs = secs;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub async fn build(self) -> anyhow::Result<TestHarness> {
        let store = Arc::new(
            self.capacity
                .map_or_else(MemoryMessageStore::new, MemoryMessageStore::with_capacity),
        );
        let listener =
            Listener::bind(Arc::new(self.config), store.clone() as Arc<dyn MessageStore>).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
        let handle = tokio::spawn(async move { listener.serve(shutdown_rx).await });

        Ok(TestHarness {
            addr,
            store,
            handle,
            shutdown_tx,
        })
    }
}
