use core::fmt::{self, Display};

use super::auth::Mechanism;

/// SMTP protocol extensions advertised in EHLO response.
///
/// Which of these a session offers depends on its configuration and on
/// whether the connection is already encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// RFC 6152. Bodies are stored as raw bytes, so 8-bit content is fine.
    EightBitMime,

    /// RFC 2034 enhanced status codes on replies.
    EnhancedStatusCodes,

    /// SIZE extension (RFC 1870) - Message size declaration and enforcement.
    ///
    /// The same limit is checked against a SIZE parameter on MAIL FROM and
    /// against the bytes actually received during DATA. Both are answered
    /// with 552 when exceeded.
    Size(usize),

    /// STARTTLS extension (RFC 3207). Only offered before the upgrade.
    Starttls,

    /// AUTH extension (RFC 4954) listing the supported mechanisms.
    Auth(Vec<Mechanism>),

    Help,
}

impl Display for Extension {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::EightBitMime => fmt.write_str("8BITMIME"),
            Self::EnhancedStatusCodes => fmt.write_str("ENHANCEDSTATUSCODES"),
            Self::Size(max) => {
                if *max == 0 {
                    fmt.write_str("SIZE")
                } else {
                    write!(fmt, "SIZE {max}")
                }
            }
            Self::Starttls => fmt.write_str("STARTTLS"),
            Self::Auth(mechanisms) => {
                fmt.write_str("AUTH")?;
                for mechanism in mechanisms {
                    write!(fmt, " {mechanism}")?;
                }
                Ok(())
            }
            Self::Help => fmt.write_str("HELP"),
        }
    }
}
