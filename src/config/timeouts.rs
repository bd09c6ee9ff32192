//! Per-operation I/O timeouts for SMTP sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Read and write deadlines applied to every individual I/O operation on a
/// connection. A deadline that expires ends only that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Time allowed for the peer to deliver the next line.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::read_secs")]
    pub read_secs: u64,

    /// Time allowed for a reply to be written out.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::write_secs")]
    pub write_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_secs: defaults::read_secs(),
            write_secs: defaults::write_secs(),
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    #[must_use]
    pub const fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

mod defaults {
    pub const fn read_secs() -> u64 {
        10
    }

    pub const fn write_secs() -> u64 {
        10
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Timeouts;

    #[test]
    fn partial_table_keeps_defaults() {
        let timeouts: Timeouts = toml::from_str("read_secs = 30").unwrap();
        assert_eq!(timeouts.read(), Duration::from_secs(30));
        assert_eq!(timeouts.write(), Duration::from_secs(10));
    }
}
