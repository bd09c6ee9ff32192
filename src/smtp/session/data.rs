use tokio::io::{AsyncRead, AsyncWrite};

use super::{
    handlers::{envelope_reply, out_of_sequence},
    Flow, Session,
};
use crate::{
    error::SessionError,
    internal,
    smtp::{
        connection::Line,
        status::{Reply, Status},
    },
};

/// Outcome of reading a message body.
enum Body {
    Received(Vec<u8>),
    Oversized,
    Disconnected,
    LineTooLong,
}

fn is_terminator(line: &[u8]) -> bool {
    line == b".\r\n" || line == b".\n"
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub(super) async fn data(&mut self) -> Result<Flow, SessionError> {
        if !self.greeted {
            return self.respond(out_of_sequence("Error: send HELO/EHLO first")).await;
        }

        if let Err(err) = self.envelope.ready_for_data() {
            return self.respond(envelope_reply(&err)).await;
        }

        self.reply(Reply::new(
            Status::StartMailInput,
            "Start mail input; end with <CRLF>.<CRLF>",
        ))
        .await?;

        let raw = match self.receive_body().await? {
            Body::Received(raw) => raw,
            Body::Oversized => {
                self.envelope.reset();
                return self
                    .respond(Reply::with_code(
                        Status::ExceededStorage,
                        "5.3.4",
                        "Message size exceeds fixed maximum message size",
                    ))
                    .await;
            }
            Body::Disconnected => {
                internal!(level = DEBUG, "{} disconnected during DATA", self.peer);
                self.envelope.reset();
                return Ok(Flow::Close);
            }
            Body::LineTooLong => {
                self.envelope.reset();
                return self.line_too_long().await;
            }
        };

        let client_ip = self.peer.ip();
        let reply = match self
            .envelope
            .complete_message(raw, client_ip, self.store.as_ref())
            .await
        {
            Ok(id) => {
                internal!(level = INFO, "Accepted message {id} from {}", self.peer);
                Reply::with_code(Status::Ok, "2.0.0", format!("Ok: queued as {id}"))
            }
            Err(err) => {
                tracing::warn!(peer = ?self.peer, %err, "Unable to store message");
                envelope_reply(&err)
            }
        };

        self.respond(reply).await
    }

    /// Read body lines up to the terminating `.` line, undoing dot-stuffing.
    ///
    /// Once the decoded size passes the limit the content is dropped, but
    /// reading continues so the reply lines up with the end of the data.
    async fn receive_body(&mut self) -> Result<Body, SessionError> {
        let limit = self.config.max_message_bytes;
        let mut raw = Vec::new();
        let mut oversized = false;

        loop {
            let line = match self.read_line().await? {
                Some(Line::Complete(line)) => line,
                Some(Line::TooLong) => return Ok(Body::LineTooLong),
                None => return Ok(Body::Disconnected),
            };

            if is_terminator(&line) {
                break;
            }

            if oversized {
                continue;
            }

            let line = line.strip_prefix(b".").unwrap_or(&line);
            if raw.len() + line.len() > limit {
                oversized = true;
                raw = Vec::new();
                continue;
            }

            raw.extend_from_slice(line);
        }

        Ok(if oversized {
            Body::Oversized
        } else {
            Body::Received(raw)
        })
    }
}

#[cfg(test)]
mod test {
    use super::is_terminator;

    #[test]
    fn terminator() {
        assert!(is_terminator(b".\r\n"));
        assert!(is_terminator(b".\n"));
        assert!(!is_terminator(b"..\r\n"));
        assert!(!is_terminator(b". \r\n"));
        assert!(!is_terminator(b"."));
    }
}
