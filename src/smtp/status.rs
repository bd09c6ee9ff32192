use core::fmt::{self, Display, Formatter};

/// SMTP reply codes used by the server.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    HelpMessage,
    ServiceReady,
    GoodBye,
    AuthSucceeded,
    Ok,
    CannotVerify,
    AuthContinue,
    StartMailInput,
    Unavailable,
    ActionUnavailable,
    InsufficientStorage,
    TemporaryAuthFailure,
    SyntaxError,
    ParameterSyntaxError,
    NotImplemented,
    InvalidCommandSequence,
    ParameterNotImplemented,
    EncryptionRequired,
    AuthRequired,
    AuthFailed,
    ExceededStorage,
    TransactionFailed,
    Unknown(u32),
}

impl Status {
    /// Checks if the status is a permanent rejection
    pub fn is_permanent(self) -> bool {
        u32::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u32::from(self))
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            214 => Self::HelpMessage,
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            235 => Self::AuthSucceeded,
            250 => Self::Ok,
            252 => Self::CannotVerify,
            334 => Self::AuthContinue,
            354 => Self::StartMailInput,
            421 => Self::Unavailable,
            451 => Self::ActionUnavailable,
            452 => Self::InsufficientStorage,
            454 => Self::TemporaryAuthFailure,
            500 => Self::SyntaxError,
            501 => Self::ParameterSyntaxError,
            502 => Self::NotImplemented,
            503 => Self::InvalidCommandSequence,
            504 => Self::ParameterNotImplemented,
            523 => Self::EncryptionRequired,
            530 => Self::AuthRequired,
            535 => Self::AuthFailed,
            552 => Self::ExceededStorage,
            554 => Self::TransactionFailed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::HelpMessage => 214,
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::AuthSucceeded => 235,
            Status::Ok => 250,
            Status::CannotVerify => 252,
            Status::AuthContinue => 334,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::ActionUnavailable => 451,
            Status::InsufficientStorage => 452,
            Status::TemporaryAuthFailure => 454,
            Status::SyntaxError => 500,
            Status::ParameterSyntaxError => 501,
            Status::NotImplemented => 502,
            Status::InvalidCommandSequence => 503,
            Status::ParameterNotImplemented => 504,
            Status::EncryptionRequired => 523,
            Status::AuthRequired => 530,
            Status::AuthFailed => 535,
            Status::ExceededStorage => 552,
            Status::TransactionFailed => 554,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}

/// A complete reply, possibly spanning several lines.
///
/// Renders as `<code> [<enhanced>] <text>`; continuation lines use `-` after
/// the code. The trailing CRLF is added by the connection.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Reply {
    status: Status,
    enhanced: Option<&'static str>,
    lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub fn new(status: Status, text: impl Into<String>) -> Self {
        Self {
            status,
            enhanced: None,
            lines: vec![text.into()],
        }
    }

    /// A reply carrying an RFC 3463 enhanced status code such as `4.5.3`.
    #[must_use]
    pub fn with_code(status: Status, enhanced: &'static str, text: impl Into<String>) -> Self {
        Self {
            status,
            enhanced: Some(enhanced),
            lines: vec![text.into()],
        }
    }

    #[must_use]
    pub fn multiline(status: Status, lines: Vec<String>) -> Self {
        Self {
            status,
            enhanced: None,
            lines,
        }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub const fn enhanced(&self) -> Option<&'static str> {
        self.enhanced
    }
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        let last = self.lines.len().saturating_sub(1);

        for (idx, line) in self.lines.iter().enumerate() {
            if idx > 0 {
                fmt.write_str("\r\n")?;
            }

            let separator = if idx == last { ' ' } else { '-' };
            match self.enhanced {
                Some(code) => write!(fmt, "{}{separator}{code} {line}", self.status)?,
                None if line.is_empty() => write!(fmt, "{}{separator}", self.status)?,
                None => write!(fmt, "{}{separator}{line}", self.status)?,
            }
        }

        Ok(())
    }
}
