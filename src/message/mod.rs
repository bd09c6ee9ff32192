//! Message records produced by completed SMTP transactions.

pub mod decode;

use std::{fmt, net::IpAddr, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the store.
pub type MessageId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Received,
    Read,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "received" => Ok(Self::Received),
            "read" => Ok(Self::Read),
            other => Err(format!("Unknown message status: {other}")),
        }
    }
}

/// Everything captured about one message at the end of its DATA phase.
///
/// Built by the session and handed straight to the store; the session never
/// touches it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Reverse path from MAIL FROM. Empty for the null sender.
    pub sender: String,
    /// Forward paths in the order the RCPT commands arrived.
    pub recipients: Vec<String>,
    /// Best-effort `Subject` header, empty when it could not be recovered.
    pub subject: String,
    /// Best-effort decoded body.
    pub body: String,
    /// The message exactly as received, after dot-unstuffing.
    pub raw: Vec<u8>,
    pub size: usize,
    /// Identity the session authenticated as, empty when anonymous.
    pub auth_user: String,
    pub client_ip: IpAddr,
}

impl MessageRecord {
    /// Recipients joined for display.
    #[must_use]
    pub fn recipients_display(&self) -> String {
        self.recipients.join(", ")
    }
}

/// A record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub received_at: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(flatten)]
    pub record: MessageRecord,
}

impl StoredMessage {
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.status == MessageStatus::Read
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.status == MessageStatus::Received
    }
}
