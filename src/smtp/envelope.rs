use std::net::IpAddr;

use crate::{
    error::EnvelopeError,
    internal,
    message::{decode, MessageId, MessageRecord},
    store::MessageStore,
};

/// Limits the envelope enforces on every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub auth_required: bool,
    pub max_recipients: usize,
}

/// Per-connection transaction state.
///
/// Tracks who the client authenticated as, the declared sender and the
/// recipients collected so far. Owned by exactly one session.
#[derive(Debug, Clone)]
pub struct Envelope {
    policy: Policy,
    identity: Option<String>,
    sender: Option<String>,
    recipients: Vec<String>,
}

impl Envelope {
    #[must_use]
    pub const fn new(policy: Policy) -> Self {
        Self {
            policy,
            identity: None,
            sender: None,
            recipients: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Record a successful authentication. It holds for the rest of the
    /// connection; a second call is ignored.
    pub fn mark_authenticated(&mut self, identity: impl Into<String>) {
        if self.identity.is_none() {
            self.identity = Some(identity.into());
        }
    }

    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Whether MAIL has been accepted and not yet completed or reset.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.sender.is_some()
    }

    fn check_auth(&self) -> Result<(), EnvelopeError> {
        if self.policy.auth_required && !self.is_authenticated() {
            Err(EnvelopeError::AuthRequired)
        } else {
            Ok(())
        }
    }

    /// Open a transaction for `sender`, discarding any incomplete one.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::AuthRequired`] when policy demands authentication.
    pub fn begin_transaction(&mut self, sender: impl Into<String>) -> Result<(), EnvelopeError> {
        self.check_auth()?;

        self.sender = Some(sender.into());
        self.recipients.clear();
        Ok(())
    }

    /// Append a recipient, preserving arrival order.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::AuthRequired`], [`EnvelopeError::NoSender`] without an
    /// open transaction, or [`EnvelopeError::TooManyRecipients`] once the
    /// ceiling is reached. The list is unchanged on error.
    pub fn add_recipient(&mut self, address: impl Into<String>) -> Result<(), EnvelopeError> {
        self.check_auth()?;

        if self.sender.is_none() {
            return Err(EnvelopeError::NoSender);
        }

        if self.recipients.len() >= self.policy.max_recipients {
            return Err(EnvelopeError::TooManyRecipients(self.policy.max_recipients));
        }

        self.recipients.push(address.into());
        Ok(())
    }

    /// Whether DATA may begin.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::AuthRequired`], [`EnvelopeError::NoSender`] or
    /// [`EnvelopeError::NoRecipients`].
    pub fn ready_for_data(&self) -> Result<(), EnvelopeError> {
        self.check_auth()?;

        if self.sender.is_none() {
            Err(EnvelopeError::NoSender)
        } else if self.recipients.is_empty() {
            Err(EnvelopeError::NoRecipients)
        } else {
            Ok(())
        }
    }

    /// Build a record from `raw` and hand it to `store`.
    ///
    /// The transaction is closed whatever the outcome, so a failed store
    /// write never leaves the session half-open.
    ///
    /// # Errors
    ///
    /// The [`Envelope::ready_for_data`] errors, or [`EnvelopeError::Store`].
    pub async fn complete_message(
        &mut self,
        raw: Vec<u8>,
        client_ip: IpAddr,
        store: &dyn MessageStore,
    ) -> Result<MessageId, EnvelopeError> {
        let ready = self.ready_for_data();
        let sender = self.sender.take();
        let recipients = std::mem::take(&mut self.recipients);
        ready?;

        let decoded = decode::decode(&raw);
        let record = MessageRecord {
            sender: sender.unwrap_or_default(),
            recipients,
            subject: decoded.subject,
            body: decoded.body,
            size: raw.len(),
            raw,
            auth_user: self.identity.clone().unwrap_or_default(),
            client_ip,
        };

        let id = store.create(record).await?;
        internal!(level = DEBUG, "Stored message {id}");

        Ok(id)
    }

    /// Clear sender and recipients. Authentication is kept.
    pub fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }
}
