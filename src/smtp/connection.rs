use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{
    rustls::{
        pki_types::{CertificateDer, PrivateKeyDer},
        ProtocolVersion, ServerConfig, ServerConnection, SupportedCipherSuite,
    },
    server::TlsStream,
    TlsAcceptor,
};

use crate::{
    config::TlsConfig,
    error::{ConnectionResult, TlsError, TlsResult},
};

const BUFFER_SIZE: usize = 8192;

#[derive(Debug)]
pub struct TlsInfo {
    version: ProtocolVersion,
    ciphers: SupportedCipherSuite,
}

impl TlsInfo {
    fn of(conn: &ServerConnection) -> TlsResult<Self> {
        Ok(Self {
            version: conn
                .protocol_version()
                .ok_or(TlsError::ProtocolInfoMissing("protocol version"))?,
            ciphers: conn
                .negotiated_cipher_suite()
                .ok_or(TlsError::ProtocolInfoMissing("cipher suite"))?,
        })
    }

    pub fn proto(&self) -> String {
        self.version
            .as_str()
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn cipher(&self) -> String {
        self.ciphers
            .suite()
            .as_str()
            .map(str::to_string)
            .unwrap_or_default()
    }
}

fn load_certs(path: &Path) -> std::io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> TlsResult<PrivateKeyDer<'static>> {
    let path_str = path.display().to_string();
    let mut reader = BufReader::new(File::open(path).map_err(|e| TlsError::KeyLoad {
        path: path_str.clone(),
        reason: e.to_string(),
    })?);

    match rustls_pemfile::read_one(&mut reader).map_err(|e| TlsError::KeyLoad {
        path: path_str.clone(),
        reason: e.to_string(),
    })? {
        Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
        Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
        Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
        _ => Err(TlsError::KeyLoad {
            path: path_str,
            reason: "Unable to determine key file format (expected PKCS1, PKCS8, or SEC1)"
                .to_string(),
        }),
    }
}

/// Build the acceptor used for every STARTTLS upgrade.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be loaded, or rustls
/// rejects the pair.
pub fn tls_acceptor(config: &TlsConfig) -> TlsResult<TlsAcceptor> {
    let certs = load_certs(&config.certificate).map_err(|e| TlsError::CertificateLoad {
        path: config.certificate.display().to_string(),
        source: e,
    })?;
    let key = load_key(&config.key)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// One line read from the peer.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// A line including its terminating LF (and CR, if sent).
    Complete(Vec<u8>),
    /// The line exceeded the limit. It has been consumed up to and including
    /// its terminator and discarded.
    TooLong,
}

pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    Plain {
        stream: Stream,
        /// Bytes received but not yet returned as a line
        pending: Vec<u8>,
    },
    Tls {
        stream: Box<TlsStream<Stream>>,
        /// Bytes received but not yet returned as a line
        pending: Vec<u8>,
    },
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    pub(crate) const fn new(stream: Stream) -> Self {
        Self::Plain {
            stream,
            pending: Vec::new(),
        }
    }

    pub(crate) const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    pub(crate) async fn send<S: core::fmt::Display + Send + Sync>(
        &mut self,
        response: &S,
    ) -> ConnectionResult<usize> {
        let buffer = format!("{response}\r\n");

        match self {
            Self::Plain { stream, .. } => {
                stream.write_all(buffer.as_bytes()).await?;
                stream.flush().await?;
            }
            Self::Tls { stream, .. } => {
                stream.write_all(buffer.as_bytes()).await?;
                stream.flush().await?;
            }
        }

        Ok(buffer.len())
    }

    async fn fill(&mut self) -> ConnectionResult<usize> {
        let mut chunk = [0; BUFFER_SIZE];

        let (read, pending) = match self {
            Self::Plain { stream, pending } => (stream.read(&mut chunk).await?, pending),
            Self::Tls { stream, pending } => (stream.read(&mut chunk).await?, pending),
        };

        pending.extend_from_slice(&chunk[..read]);
        Ok(read)
    }

    fn pending(&mut self) -> &mut Vec<u8> {
        match self {
            Self::Plain { pending, .. } | Self::Tls { pending, .. } => pending,
        }
    }

    /// Read the next LF-terminated line of at most `limit` bytes.
    ///
    /// Never buffers much more than `limit` bytes of a single line. Returns
    /// `Ok(None)` once the peer closes the connection; a partial trailing line
    /// is dropped.
    pub(crate) async fn read_line(&mut self, limit: usize) -> ConnectionResult<Option<Line>> {
        let mut overflowed = false;
        let mut searched = 0;

        loop {
            let pending = self.pending();

            if let Some(idx) = pending[searched..].iter().position(|&b| b == b'\n') {
                let end = searched + idx + 1;
                let line: Vec<u8> = pending.drain(..end).collect();

                return Ok(Some(if overflowed || line.len() > limit {
                    Line::TooLong
                } else {
                    Line::Complete(line)
                }));
            }

            if pending.len() > limit {
                overflowed = true;
                pending.clear();
            }
            searched = pending.len();

            if self.fill().await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Switch to TLS. Anything the client pipelined after STARTTLS on the
    /// plaintext channel is discarded.
    pub(crate) async fn upgrade(self, acceptor: &TlsAcceptor) -> TlsResult<(Self, TlsInfo)> {
        match self {
            Self::Plain { stream, .. } => {
                let stream = acceptor.accept(stream).await?;
                let info = TlsInfo::of(stream.get_ref().1)?;

                Ok((
                    Self::Tls {
                        stream: Box::new(stream),
                        pending: Vec::new(),
                    },
                    info,
                ))
            }
            Self::Tls { .. } => Err(TlsError::AlreadyEncrypted),
        }
    }
}
