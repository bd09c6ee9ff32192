//! Configuration for the blackhole server.
//!
//! Configuration is read once at startup from a TOML file, validated, and then
//! handed to the listener as an immutable value. Every field has a default so
//! a minimal file only needs to name what differs.
//!
//! - [`timeouts`]: per-operation read/write deadlines
//! - [`tls`]: certificate material for STARTTLS

pub mod timeouts;
pub mod tls;

use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
pub use timeouts::Timeouts;
pub use tls::TlsConfig;

use crate::error::ConfigError;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "BLACKHOLE_CONFIG";

/// Locations searched, in order, when neither a flag nor [`CONFIG_ENV`] is given.
pub const DEFAULT_PATHS: [&str; 2] = ["./blackhole.toml", "/etc/blackhole/blackhole.toml"];

/// Smallest line limit accepted; RFC 5321 requires at least 512 octets.
const MIN_LINE_LENGTH: usize = 512;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Address the listener binds to.
    #[serde(default = "defaults::listen")]
    pub listen: SocketAddr,

    /// Domain announced in the greeting and EHLO reply.
    #[serde(default = "defaults::domain")]
    pub domain: String,

    /// Greeting text. Defaults to `<domain> ESMTP Service Ready`.
    #[serde(default)]
    pub banner: Option<String>,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Largest message body accepted, in bytes after dot-unstuffing.
    #[serde(default = "defaults::max_message_bytes")]
    pub max_message_bytes: usize,

    /// Recipients accepted per transaction.
    #[serde(default = "defaults::max_recipients")]
    pub max_recipients: usize,

    /// Longest command or body line accepted, CRLF included.
    #[serde(default = "defaults::max_line_length")]
    pub max_line_length: usize,

    /// Offer AUTH on connections that have not been upgraded to TLS.
    #[serde(default = "defaults::allow_insecure_auth")]
    pub allow_insecure_auth: bool,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            domain: defaults::domain(),
            banner: None,
            timeouts: Timeouts::default(),
            max_message_bytes: defaults::max_message_bytes(),
            max_recipients: defaults::max_recipients(),
            max_line_length: defaults::max_line_length(),
            allow_insecure_auth: defaults::allow_insecure_auth(),
            tls: TlsConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl SmtpConfig {
    /// The text following `220` in the greeting.
    #[must_use]
    pub fn banner(&self) -> String {
        self.banner
            .clone()
            .filter(|banner| !banner.trim().is_empty())
            .unwrap_or_else(|| format!("{} ESMTP Service Ready", self.domain))
    }
}

/// The single shared credential pair, and whether it must be presented.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("required", &self.required)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of messages held. Unlimited when absent.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Config {
    /// Read, parse and validate the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails [`Config::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        content.parse()
    }

    /// Check the values that cannot be expressed through types alone.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let smtp = &self.smtp;

        if smtp.domain.trim().is_empty() {
            return Err(invalid("smtp.domain", "must not be empty"));
        }

        if smtp.max_recipients == 0 {
            return Err(invalid("smtp.max_recipients", "must be greater than 0"));
        }

        if smtp.max_message_bytes == 0 {
            return Err(invalid("smtp.max_message_bytes", "must be greater than 0"));
        }

        if smtp.max_line_length < MIN_LINE_LENGTH {
            return Err(invalid(
                "smtp.max_line_length",
                format!("must be at least {MIN_LINE_LENGTH}"),
            ));
        }

        if smtp.timeouts.read_secs == 0 {
            return Err(invalid("smtp.timeouts.read_secs", "must be greater than 0"));
        }

        if smtp.timeouts.write_secs == 0 {
            return Err(invalid("smtp.timeouts.write_secs", "must be greater than 0"));
        }

        if smtp.auth.required && (smtp.auth.username.is_empty() || smtp.auth.password.is_empty())
        {
            return Err(invalid(
                "smtp.auth",
                "username and password are required when authentication is required",
            ));
        }

        if smtp.tls.is_enabled() {
            for (field, path) in [
                ("smtp.tls.certificate", &smtp.tls.certificate),
                ("smtp.tls.key", &smtp.tls.key),
            ] {
                if !path.try_exists().unwrap_or(false) {
                    return Err(invalid(
                        field,
                        format!("{} does not exist", path.display()),
                    ));
                }
            }
        }

        if self.store.capacity == Some(0) {
            return Err(invalid("store.capacity", "must be greater than 0"));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Pick the configuration file to load.
///
/// An explicit path (from the command line) wins, then the value of
/// [`CONFIG_ENV`], then the first of [`DEFAULT_PATHS`] that exists. Explicit
/// and environment paths must exist; they are never silently skipped.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] listing every path that was tried.
pub fn locate(explicit: Option<PathBuf>, env: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit.or(env) {
        return if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::NotFound(vec![path]))
        };
    }

    let mut candidates: Vec<PathBuf> = DEFAULT_PATHS.iter().map(PathBuf::from).collect();

    match candidates.iter().position(|path| path.exists()) {
        Some(found) => Ok(candidates.swap_remove(found)),
        None => Err(ConfigError::NotFound(candidates)),
    }
}

mod defaults {
    use std::net::{Ipv4Addr, SocketAddr};

    pub const fn listen() -> SocketAddr {
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2525)
    }

    pub fn domain() -> String {
        String::from("localhost")
    }

    pub const fn max_message_bytes() -> usize {
        10 * 1024 * 1024
    }

    pub const fn max_recipients() -> usize {
        50
    }

    pub const fn max_line_length() -> usize {
        2000
    }

    pub const fn allow_insecure_auth() -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::{locate, Config};
    use crate::error::ConfigError;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = "".parse().unwrap();

        assert_eq!(config.smtp.listen.port(), 2525);
        assert_eq!(config.smtp.domain, "localhost");
        assert_eq!(config.smtp.max_message_bytes, 10_485_760);
        assert_eq!(config.smtp.max_recipients, 50);
        assert_eq!(config.smtp.timeouts.read_secs, 10);
        assert!(config.smtp.allow_insecure_auth);
        assert!(!config.smtp.auth.required);
        assert!(!config.smtp.tls.enabled);
        assert_eq!(config.smtp.banner(), "localhost ESMTP Service Ready");
    }

    #[test]
    fn full_file() {
        let config: Config = r#"
            [smtp]
            listen = "127.0.0.1:2626"
            domain = "mail.test"
            banner = "blackhole ready"
            max_message_bytes = 1024
            max_recipients = 3
            allow_insecure_auth = false

            [smtp.timeouts]
            read_secs = 5

            [smtp.auth]
            required = true
            username = "mailuser"
            password = "mailpass"

            [store]
            capacity = 100
        "#
        .parse()
        .unwrap();

        assert_eq!(
            config.smtp.listen,
            "127.0.0.1:2626".parse::<std::net::SocketAddr>().unwrap()
        );
        assert_eq!(config.smtp.banner(), "blackhole ready");
        assert_eq!(config.smtp.max_recipients, 3);
        assert_eq!(config.smtp.timeouts.read_secs, 5);
        assert_eq!(config.smtp.timeouts.write_secs, 10);
        assert!(config.smtp.auth.required);
        assert_eq!(config.store.capacity, Some(100));
    }

    #[test]
    fn password_is_not_debug_printed() {
        let config: Config = "[smtp.auth]\nusername = \"u\"\npassword = \"hunter2\"".parse().unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn validation() {
        for (content, field) in [
            ("[smtp]\nmax_recipients = 0", "smtp.max_recipients"),
            ("[smtp]\nmax_message_bytes = 0", "smtp.max_message_bytes"),
            ("[smtp]\nmax_line_length = 80", "smtp.max_line_length"),
            ("[smtp.timeouts]\nwrite_secs = 0", "smtp.timeouts.write_secs"),
            ("[smtp.auth]\nrequired = true", "smtp.auth"),
            (
                "[smtp.tls]\nenabled = true\ncertificate = \"/nonexistent/cert.pem\"",
                "smtp.tls.certificate",
            ),
            ("[store]\ncapacity = 0", "store.capacity"),
        ] {
            match content.parse::<Config>() {
                Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{content:?} should fail on {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            "[smtp\nlisten = ".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_and_locate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[smtp]\ndomain = \"file.test\"").unwrap();

        let path = locate(Some(file.path().to_path_buf()), None).unwrap();
        assert_eq!(path, file.path());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.smtp.domain, "file.test");

        let env = locate(None, Some(file.path().to_path_buf())).unwrap();
        assert_eq!(env, file.path());

        assert!(matches!(
            locate(Some("/nonexistent/blackhole.toml".into()), None),
            Err(ConfigError::NotFound(paths)) if paths.len() == 1
        ));

        assert!(matches!(
            Config::load("/nonexistent/blackhole.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
