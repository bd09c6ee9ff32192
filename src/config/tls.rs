//! Certificate material for the STARTTLS upgrade.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Offer STARTTLS. Without this the certificate and key are ignored.
    #[serde(default)]
    pub enabled: bool,

    /// PEM encoded certificate chain.
    #[serde(default)]
    pub certificate: PathBuf,

    /// PEM encoded private key (PKCS1, PKCS8 or SEC1).
    #[serde(default)]
    pub key: PathBuf,
}

impl TlsConfig {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}
