//! SMTP AUTH (RFC 4954) with the PLAIN mechanism (RFC 4616).
//!
//! Credentials are checked by an [`Authenticator`]. The server ships a single
//! implementation comparing against one statically configured pair.

use core::fmt::{self, Display};
use std::{str::FromStr, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{config::AuthConfig, error::AuthError};

/// Decides whether a username and password are acceptable.
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when the pair is rejected.
    fn validate(&self, username: &str, password: &str) -> Result<(), AuthError>;
}

/// Accepts exactly one username and password.
#[derive(Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl From<&AuthConfig> for StaticCredentials {
    fn from(config: &AuthConfig) -> Self {
        Self::new(config.username.clone(), config.password.clone())
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Compare in time independent of where, or whether, the inputs differ.
///
/// Both sides are padded to the longer length with different filler so the
/// length check does not short-circuit the byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    let len = a.len().max(b.len());

    let mut a_padded = vec![0u8; len];
    let mut b_padded = vec![0xFFu8; len];
    a_padded[..a.len()].copy_from_slice(a);
    b_padded[..b.len()].copy_from_slice(b);

    let lengths_equal = a.len().ct_eq(&b.len());
    let bytes_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & bytes_equal).into()
}

impl Authenticator for StaticCredentials {
    fn validate(&self, username: &str, password: &str) -> Result<(), AuthError> {
        // An unconfigured pair must never match an empty submission.
        if self.username.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());

        if user_ok & pass_ok {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    Plain,
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "PLAIN",
        })
    }
}

impl FromStr for Mechanism {
    type Err = AuthError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.eq_ignore_ascii_case("PLAIN") {
            Ok(Self::Plain)
        } else {
            Err(AuthError::UnsupportedMechanism(name.to_string()))
        }
    }
}

/// Decoded PLAIN response: `authzid NUL authcid NUL passwd`.
#[derive(PartialEq, Eq)]
pub struct PlainCredentials {
    pub authzid: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PlainCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainCredentials")
            .field("authzid", &self.authzid)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl PlainCredentials {
    /// Decode a base64 client response.
    ///
    /// # Errors
    ///
    /// [`AuthError::Cancelled`] for `*`, otherwise [`AuthError::Malformed`]
    /// when the response is not base64 of three NUL separated UTF-8 fields.
    pub fn decode(response: &str) -> Result<Self, AuthError> {
        let response = response.trim();
        if response == "*" {
            return Err(AuthError::Cancelled);
        }

        let decoded = STANDARD
            .decode(response)
            .map_err(|_| AuthError::Malformed("invalid base64"))?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| AuthError::Malformed("invalid UTF-8"))?;

        let mut fields = decoded.split('\0');
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(authzid), Some(username), Some(password), None) if !username.is_empty() => {
                Ok(Self {
                    authzid: authzid.to_string(),
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            _ => Err(AuthError::Malformed("expected authzid, username and password")),
        }
    }
}

/// Runs the credential check for every offered mechanism.
#[derive(Debug, Clone)]
pub struct Negotiator {
    authenticator: Arc<dyn Authenticator>,
}

impl Negotiator {
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }

    /// Mechanisms advertised in EHLO.
    #[must_use]
    pub const fn mechanisms(&self) -> &'static [Mechanism] {
        &[Mechanism::Plain]
    }

    /// Complete an exchange for `mechanism` with the client's `response`,
    /// returning the authenticated identity. A PLAIN authorization identity
    /// is accepted but ignored; the session always acts as the username.
    ///
    /// # Errors
    ///
    /// Any [`AuthError`]; none of them change session state.
    pub fn authenticate(&self, mechanism: Mechanism, response: &str) -> Result<String, AuthError> {
        match mechanism {
            Mechanism::Plain => {
                let credentials = PlainCredentials::decode(response)?;

                self.authenticator
                    .validate(&credentials.username, &credentials.password)?;

                Ok(credentials.username)
            }
        }
    }
}
