//! Minimal line-oriented SMTP client for driving the server in tests.

use std::net::SocketAddr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tokio_rustls::{client::TlsStream, rustls::pki_types::ServerName, TlsConnector};

/// A reply as read off the wire.
#[derive(Debug, Clone)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    /// The text of the last line, without the code.
    pub fn text(&self) -> &str {
        self.lines
            .last()
            .and_then(|line| line.get(4..))
            .unwrap_or_default()
    }

    /// The full last line, code included.
    pub fn last(&self) -> &str {
        self.lines.last().map_or("", String::as_str)
    }
}

pub struct Client<Stream = TcpStream> {
    stream: BufReader<Stream>,
}

impl Client {
    /// Connect and consume the greeting.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<(Self, Response)> {
        let mut client = Self {
            stream: BufReader::new(TcpStream::connect(addr).await?),
        };

        let greeting = client.read_response().await?;
        Ok((client, greeting))
    }

    /// Issue STARTTLS and perform the handshake as `server_name`.
    pub async fn starttls(
        mut self,
        connector: &TlsConnector,
        server_name: &'static str,
    ) -> anyhow::Result<Client<TlsStream<TcpStream>>> {
        let reply = self.command("STARTTLS").await?;
        anyhow::ensure!(reply.code == 220, "STARTTLS rejected: {}", reply.last());

        let stream = connector
            .connect(ServerName::try_from(server_name)?, self.stream.into_inner())
            .await?;

        Ok(Client {
            stream: BufReader::new(stream),
        })
    }
}

impl<Stream: AsyncRead + AsyncWrite + Unpin> Client<Stream> {
    pub async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let writer = self.stream.get_mut();
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.send_raw(format!("{line}\r\n").as_bytes()).await
    }

    /// Read one reply, following `-` continuation lines.
    pub async fn read_response(&mut self) -> anyhow::Result<Response> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line).await? == 0 {
                anyhow::bail!("Connection closed after {} reply lines", lines.len());
            }

            let line = line.trim_end().to_string();
            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| anyhow::anyhow!("Malformed reply line: {line}"))?;
            let last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line);

            if last {
                return Ok(Response { code, lines });
            }
        }
    }

    pub async fn command(&mut self, line: &str) -> anyhow::Result<Response> {
        self.send_line(line).await?;
        self.read_response().await
    }

    /// Returns `true` once the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(self.stream.read_line(&mut line).await, Ok(0) | Err(_))
    }

    pub async fn ehlo(&mut self) -> anyhow::Result<Response> {
        self.command("EHLO client.test").await
    }

    pub async fn auth_plain(&mut self, username: &str, password: &str) -> anyhow::Result<Response> {
        let response = STANDARD.encode(format!("\0{username}\0{password}"));
        self.command(&format!("AUTH PLAIN {response}")).await
    }

    /// Run MAIL, RCPT and DATA, returning the reply to the final dot.
    ///
    /// `body` lines must already be dot-stuffed.
    pub async fn send_message(
        &mut self,
        from: &str,
        to: &[&str],
        body: &str,
    ) -> anyhow::Result<Response> {
        let reply = self.command(&format!("MAIL FROM:<{from}>")).await?;
        anyhow::ensure!(reply.code == 250, "MAIL rejected: {}", reply.last());

        for recipient in to {
            let reply = self.command(&format!("RCPT TO:<{recipient}>")).await?;
            anyhow::ensure!(reply.code == 250, "RCPT rejected: {}", reply.last());
        }

        let reply = self.command("DATA").await?;
        anyhow::ensure!(reply.code == 354, "DATA rejected: {}", reply.last());

        self.send_raw(body.as_bytes()).await?;
        self.command(".").await
    }
}
