use tokio::io::{AsyncRead, AsyncWrite};

use super::{Flow, Session};
use crate::{
    error::{AuthError, CommandError, EnvelopeError, SessionError},
    incoming, internal,
    smtp::{
        auth::Mechanism,
        command::{Command, HeloVariant, MailParameters},
        connection::Line,
        extensions::Extension,
        status::{Reply, Status},
    },
};

const HELP_TEXT: &str =
    "Supported commands: EHLO HELO MAIL RCPT DATA RSET NOOP VRFY HELP QUIT AUTH STARTTLS";

/// The reply for an envelope rejection.
pub(super) fn envelope_reply(err: &EnvelopeError) -> Reply {
    match err {
        EnvelopeError::AuthRequired => Reply::with_code(
            Status::AuthRequired,
            "5.7.0",
            "Authentication required",
        ),
        EnvelopeError::NoSender => Reply::with_code(
            Status::InvalidCommandSequence,
            "5.5.1",
            "Error: need MAIL command",
        ),
        EnvelopeError::NoRecipients => Reply::with_code(
            Status::InvalidCommandSequence,
            "5.5.1",
            "Error: need RCPT command",
        ),
        EnvelopeError::TooManyRecipients(_) => Reply::with_code(
            Status::InsufficientStorage,
            "4.5.3",
            "Error: too many recipients",
        ),
        EnvelopeError::Store(err) if err.is_temporary() => Reply::with_code(
            Status::ActionUnavailable,
            "4.3.0",
            "Error: unable to store message, try again later",
        ),
        EnvelopeError::Store(_) => Reply::with_code(
            Status::TransactionFailed,
            "5.3.0",
            "Error: message could not be stored",
        ),
    }
}

fn command_reply(err: &CommandError) -> Reply {
    match err {
        CommandError::Unrecognised(_) | CommandError::NotUtf8 => Reply::with_code(
            Status::SyntaxError,
            "5.5.2",
            "Error: command not recognized",
        ),
        CommandError::Syntax { verb, reason } => Reply::with_code(
            Status::ParameterSyntaxError,
            "5.5.2",
            format!("Syntax error in {verb}: {reason}"),
        ),
    }
}

fn ok(enhanced: &'static str, text: impl Into<String>) -> Reply {
    Reply::with_code(Status::Ok, enhanced, text)
}

pub(super) fn out_of_sequence(text: &str) -> Reply {
    Reply::with_code(Status::InvalidCommandSequence, "5.5.1", text)
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    /// Parse one command line and answer it.
    pub(super) async fn dispatch(&mut self, line: &[u8]) -> Result<Flow, SessionError> {
        let command = match Command::try_from(line) {
            Ok(command) => command,
            Err(err) => {
                incoming!("{err}");
                return self.respond(command_reply(&err)).await;
            }
        };

        incoming!("{command}");

        match command {
            Command::Helo(variant) => self.helo(variant).await,
            Command::MailFrom(sender, params) => self.mail_from(sender, &params).await,
            Command::RcptTo(recipient) => self.rcpt_to(recipient).await,
            Command::Data => self.data().await,
            Command::Auth {
                mechanism,
                initial_response,
            } => self.auth(&mechanism, initial_response).await,
            Command::StartTls => self.starttls().await,
            Command::Rset => {
                self.envelope.reset();
                self.respond(ok("2.0.0", "Ok")).await
            }
            Command::Noop => self.respond(ok("2.0.0", "Ok")).await,
            Command::Vrfy(_) => {
                self.respond(Reply::with_code(
                    Status::CannotVerify,
                    "2.5.0",
                    "Cannot VRFY user, but will accept message and attempt delivery",
                ))
                .await
            }
            Command::Help => {
                self.respond(Reply::with_code(Status::HelpMessage, "2.0.0", HELP_TEXT))
                    .await
            }
            Command::Quit => {
                self.reply(Reply::with_code(Status::GoodBye, "2.0.0", "Bye"))
                    .await?;
                Ok(Flow::Close)
            }
        }
    }

    pub(super) async fn respond(&mut self, reply: Reply) -> Result<Flow, SessionError> {
        self.reply(reply).await?;
        Ok(Flow::Continue)
    }

    fn extensions(&self) -> Vec<Extension> {
        let mut extensions = vec![
            Extension::EightBitMime,
            Extension::EnhancedStatusCodes,
            Extension::Size(self.config.max_message_bytes),
        ];

        if self.tls.is_some() && !self.connection.is_tls() {
            extensions.push(Extension::Starttls);
        }

        if self.auth_allowed() {
            extensions.push(Extension::Auth(self.negotiator.mechanisms().to_vec()));
        }

        extensions.push(Extension::Help);
        extensions
    }

    fn auth_allowed(&self) -> bool {
        self.connection.is_tls() || self.config.allow_insecure_auth
    }

    async fn helo(&mut self, variant: HeloVariant) -> Result<Flow, SessionError> {
        self.envelope.reset();
        self.greeted = true;

        let greeting = format!("{} Hello {}", self.config.domain, variant.host());
        let reply = match variant {
            HeloVariant::Helo(_) => Reply::new(Status::Ok, greeting),
            HeloVariant::Ehlo(_) => Reply::multiline(
                Status::Ok,
                std::iter::once(greeting)
                    .chain(self.extensions().iter().map(ToString::to_string))
                    .collect(),
            ),
        };

        self.respond(reply).await
    }

    async fn mail_from(
        &mut self,
        sender: String,
        params: &MailParameters,
    ) -> Result<Flow, SessionError> {
        if !self.greeted {
            return self.respond(out_of_sequence("Error: send HELO/EHLO first")).await;
        }

        if params
            .size()
            .is_some_and(|size| size > self.config.max_message_bytes)
        {
            return self
                .respond(Reply::with_code(
                    Status::ExceededStorage,
                    "5.3.4",
                    "Message size exceeds fixed maximum message size",
                ))
                .await;
        }

        match self.envelope.begin_transaction(sender) {
            Ok(()) => self.respond(ok("2.1.0", "Ok")).await,
            Err(err) => self.respond(envelope_reply(&err)).await,
        }
    }

    async fn rcpt_to(&mut self, recipient: String) -> Result<Flow, SessionError> {
        if !self.greeted {
            return self.respond(out_of_sequence("Error: send HELO/EHLO first")).await;
        }

        match self.envelope.add_recipient(recipient) {
            Ok(()) => self.respond(ok("2.1.5", "Ok")).await,
            Err(err) => self.respond(envelope_reply(&err)).await,
        }
    }

    async fn auth(
        &mut self,
        mechanism: &str,
        initial_response: Option<String>,
    ) -> Result<Flow, SessionError> {
        if !self.greeted {
            return self.respond(out_of_sequence("Error: send HELO/EHLO first")).await;
        }

        if self.envelope.is_authenticated() {
            return self.respond(out_of_sequence("Error: already authenticated")).await;
        }

        if !self.auth_allowed() {
            return self
                .respond(Reply::with_code(
                    Status::EncryptionRequired,
                    "5.7.10",
                    "Encryption required for requested authentication mechanism",
                ))
                .await;
        }

        if self.envelope.in_transaction() {
            return self
                .respond(out_of_sequence("Error: AUTH not permitted during a mail transaction"))
                .await;
        }

        let mechanism = match mechanism.parse::<Mechanism>() {
            Ok(mechanism) => mechanism,
            Err(_) => {
                return self
                    .respond(Reply::with_code(
                        Status::ParameterNotImplemented,
                        "5.5.4",
                        "Unrecognized authentication type",
                    ))
                    .await;
            }
        };

        let response = match initial_response {
            // A lone "=" is an empty initial response.
            Some(response) if response == "=" => String::new(),
            Some(response) => response,
            None => {
                self.reply(Reply::new(Status::AuthContinue, "")).await?;

                match self.read_line().await? {
                    Some(Line::Complete(bytes)) => {
                        String::from_utf8_lossy(&bytes).trim().to_string()
                    }
                    Some(Line::TooLong) => return self.line_too_long().await,
                    None => return Ok(Flow::Close),
                }
            }
        };

        match self.negotiator.authenticate(mechanism, &response) {
            Ok(identity) => {
                internal!(level = INFO, "{} authenticated as {identity}", self.peer);
                self.envelope.mark_authenticated(identity);
                self.respond(Reply::with_code(
                    Status::AuthSucceeded,
                    "2.7.0",
                    "Authentication successful",
                ))
                .await
            }
            Err(AuthError::Cancelled) => {
                self.respond(Reply::with_code(
                    Status::ParameterSyntaxError,
                    "5.0.0",
                    "Authentication cancelled",
                ))
                .await
            }
            Err(AuthError::Malformed(reason)) => {
                internal!(level = DEBUG, "Malformed AUTH response from {}: {reason}", self.peer);
                self.respond(Reply::with_code(
                    Status::TemporaryAuthFailure,
                    "4.7.0",
                    "Temporary authentication failure",
                ))
                .await
            }
            Err(err) => {
                tracing::warn!(peer = ?self.peer, %err, "Authentication failed");
                self.respond(Reply::with_code(
                    Status::AuthFailed,
                    "5.7.8",
                    "Authentication credentials invalid",
                ))
                .await
            }
        }
    }

    async fn starttls(&mut self) -> Result<Flow, SessionError> {
        if self.tls.is_none() || self.connection.is_tls() {
            return self
                .respond(Reply::with_code(
                    Status::NotImplemented,
                    "5.5.1",
                    "Error: STARTTLS not available",
                ))
                .await;
        }

        if !self.greeted {
            return self.respond(out_of_sequence("Error: send HELO/EHLO first")).await;
        }

        self.reply(Reply::with_code(
            Status::ServiceReady,
            "2.0.0",
            "Ready to start TLS",
        ))
        .await?;

        Ok(Flow::StartTls)
    }
}
