use core::fmt::{self, Display, Formatter};
use std::collections::BTreeMap;

use mailparse::MailAddr;

use crate::error::CommandError;

/// ESMTP parameters for MAIL FROM command (RFC 5321 Section 3.3).
///
/// Keys are normalised to uppercase. Only SIZE (RFC 1870) is interpreted;
/// everything else is carried along unchecked.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MailParameters {
    params: BTreeMap<String, Option<String>>,
}

impl MailParameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses ESMTP parameters from a string.
    ///
    /// Parses parameter tokens in the form `KEY=VALUE` or `FLAG`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A parameter appears multiple times
    /// - SIZE parameter has an invalid value (non-numeric or zero)
    pub fn from_params_str(params_str: &str) -> Result<Self, String> {
        let mut params = Self::new();

        for token in params_str.split_whitespace() {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key.to_ascii_uppercase(), Some(value.to_string())),
                None => (token.to_ascii_uppercase(), None),
            };

            if params.params.contains_key(&key) {
                return Err(format!("Duplicate parameter '{key}' not allowed"));
            }

            if key == "SIZE" {
                match value.as_deref().map(str::parse::<usize>) {
                    Some(Ok(0)) => return Err(String::from("SIZE=0 is not allowed")),
                    Some(Ok(_)) => {}
                    _ => return Err(format!("Invalid SIZE value: {}", value.unwrap_or_default())),
                }
            }

            params.params.insert(key, value);
        }

        Ok(params)
    }

    /// Adds a parameter with a value.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.params
            .insert(key.as_ref().to_ascii_uppercase(), Some(value.into()));
    }

    /// Gets a parameter value by key (case-insensitive).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_ascii_uppercase())?.as_deref()
    }

    /// Gets the SIZE parameter value, if present.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.get("SIZE")?.parse().ok()
    }

    /// Checks if the parameter set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Display for MailParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.params {
            if !first {
                f.write_str(" ")?;
            }
            first = false;

            match v {
                None => f.write_str(k)?,
                Some(val) => write!(f, "{k}={val}")?,
            }
        }
        Ok(())
    }
}

#[derive(PartialEq, PartialOrd, Eq, Hash, Clone, Debug)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl HeloVariant {
    /// The client's self-reported host name.
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Ehlo(host) | Self::Helo(host) => host,
        }
    }
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Command {
    Helo(HeloVariant),
    /// An empty sender is the null reverse-path, `<>`.
    MailFrom(String, MailParameters),
    RcptTo(String),
    Auth {
        mechanism: String,
        initial_response: Option<String>,
    },
    Data,
    Rset,
    Noop,
    Vrfy(String),
    Help,
    Quit,
    StartTls,
}

impl Command {
    /// Extract the SIZE parameter from a MAIL FROM command, if present.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::MailFrom(_, params) => params.size(),
            _ => None,
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(variant) => write!(fmt, "{variant} {}", variant.host()),
            Self::MailFrom(sender, params) if params.is_empty() => {
                write!(fmt, "MAIL FROM:<{sender}>")
            }
            Self::MailFrom(sender, params) => write!(fmt, "MAIL FROM:<{sender}> {params}"),
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:<{rcpt}>"),
            // Never echo credentials.
            Self::Auth { mechanism, .. } => write!(fmt, "AUTH {mechanism}"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Vrfy(arg) => write!(fmt, "VRFY {arg}"),
            Self::Help => fmt.write_str("HELP"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::StartTls => fmt.write_str("STARTTLS"),
        }
    }
}

/// Case-insensitive prefix match that never splits a multi-byte character.
fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    value
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &value[prefix.len()..])
}

fn syntax(verb: &'static str, reason: impl Into<String>) -> CommandError {
    CommandError::Syntax {
        verb,
        reason: reason.into(),
    }
}

/// Parse a path argument such as `<user@example.com>` or a bare address.
///
/// Returns the mailbox without angle brackets; `<>` yields an empty string.
fn parse_path(verb: &'static str, path: &str) -> Result<String, CommandError> {
    let inner = match path.strip_prefix('<') {
        Some(rest) => rest
            .strip_suffix('>')
            .ok_or_else(|| syntax(verb, format!("Unterminated path {path}")))?,
        None => path,
    };

    if inner.is_empty() {
        return Ok(String::new());
    }

    match mailparse::addrparse(inner) {
        Ok(addrs) => match addrs.first() {
            Some(MailAddr::Single(single)) if addrs.len() == 1 && single.addr.contains('@') => {
                Ok(single.addr.clone())
            }
            _ => Err(syntax(verb, format!("Invalid address {inner}"))),
        },
        Err(err) => Err(syntax(verb, err.to_string())),
    }
}

/// Split `<path> [params]` into the path token and the remainder.
fn split_path(rest: &str) -> (&str, &str) {
    let rest = rest.trim_start();
    let end = if rest.starts_with('<') {
        rest.find('>').map_or(rest.len(), |idx| idx + 1)
    } else {
        rest.find(char::is_whitespace).unwrap_or(rest.len())
    };

    (&rest[..end], rest[end..].trim())
}

fn no_arguments(verb: &'static str, command: Command, args: &str) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(syntax(verb, format!("{verb} takes no arguments")))
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let trimmed = command.trim();

        if let Some(rest) = strip_prefix_ignore_case(trimmed, "MAIL FROM:") {
            let (path, params) = split_path(rest);
            if path.is_empty() {
                return Err(syntax("MAIL", "Expected a reverse-path"));
            }

            let params = MailParameters::from_params_str(params).map_err(|e| syntax("MAIL", e))?;
            return Ok(Self::MailFrom(parse_path("MAIL", path)?, params));
        }

        if let Some(rest) = strip_prefix_ignore_case(trimmed, "RCPT TO:") {
            let (path, _params) = split_path(rest);
            let recipient = parse_path("RCPT", path)?;
            if recipient.is_empty() {
                return Err(syntax("RCPT", "Expected a forward-path"));
            }

            return Ok(Self::RcptTo(recipient));
        }

        let (verb, args) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(verb, args)| (verb, args.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "EHLO" | "HELO" if args.is_empty() => Err(syntax("HELO", "Expected hostname")),
            "EHLO" => Ok(Self::Helo(HeloVariant::Ehlo(args.to_string()))),
            "HELO" => Ok(Self::Helo(HeloVariant::Helo(args.to_string()))),
            "MAIL" => Err(syntax("MAIL", "Expected MAIL FROM:<address>")),
            "RCPT" => Err(syntax("RCPT", "Expected RCPT TO:<address>")),
            "AUTH" => {
                let mut parts = args.split_whitespace();
                let mechanism = parts
                    .next()
                    .ok_or_else(|| syntax("AUTH", "Expected a mechanism"))?;
                let initial_response = parts.next().map(str::to_string);

                if parts.next().is_some() {
                    return Err(syntax("AUTH", "Too many arguments"));
                }

                Ok(Self::Auth {
                    mechanism: mechanism.to_ascii_uppercase(),
                    initial_response,
                })
            }
            "DATA" => no_arguments("DATA", Self::Data, args),
            "RSET" => no_arguments("RSET", Self::Rset, args),
            "QUIT" => no_arguments("QUIT", Self::Quit, args),
            "STARTTLS" => no_arguments("STARTTLS", Self::StartTls, args),
            "NOOP" => Ok(Self::Noop),
            "HELP" => Ok(Self::Help),
            "VRFY" if args.is_empty() => Err(syntax("VRFY", "Expected an argument")),
            "VRFY" => Ok(Self::Vrfy(args.to_string())),
            _ => Err(CommandError::Unrecognised(trimmed.to_string())),
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = CommandError;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or(Err(CommandError::NotUtf8), Self::try_from)
    }
}

impl TryFrom<String> for Command {
    type Error = CommandError;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}
