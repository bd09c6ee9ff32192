use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use async_trait::async_trait;
use chrono::Utc;

use super::MessageStore;
use crate::{
    error::{StoreError, StoreResult},
    message::{MessageId, MessageRecord, MessageStatus, StoredMessage},
};

/// In-memory message store.
///
/// Messages live in a `BTreeMap` behind an `RwLock`, keyed by an identifier
/// drawn from an atomic counter starting at 1. Nothing survives a restart.
///
/// # Capacity Management
/// An optional capacity bounds memory use. Once reached, `create` fails with
/// [`StoreError::CapacityExceeded`], which sessions report as a temporary
/// failure so the peer may retry after the store is emptied.
#[derive(Debug, Clone)]
pub struct MemoryMessageStore {
    messages: Arc<RwLock<BTreeMap<MessageId, StoredMessage>>>,
    next_id: Arc<AtomicU64>,
    capacity: Option<usize>,
}

impl MemoryMessageStore {
    /// Create a new empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: None,
        }
    }

    /// Create a new store holding at most `capacity` messages
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create(&self, record: MessageRecord) -> StoreResult<MessageId> {
        let mut messages = self.messages.write()?;

        if let Some(capacity) = self.capacity {
            if messages.len() >= capacity {
                return Err(StoreError::CapacityExceeded {
                    len: messages.len(),
                    capacity,
                });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        messages.insert(
            id,
            StoredMessage {
                id,
                received_at: Utc::now(),
                status: MessageStatus::Received,
                record,
            },
        );

        Ok(id)
    }

    async fn get(&self, id: MessageId) -> StoreResult<StoredMessage> {
        self.messages
            .read()?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> StoreResult<Vec<StoredMessage>> {
        let mut messages: Vec<_> = self.messages.read()?.values().cloned().collect();

        messages.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(messages)
    }

    async fn update_status(&self, id: MessageId, status: MessageStatus) -> StoreResult<()> {
        self.messages
            .write()?
            .get_mut(&id)
            .map(|message| message.status = status)
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete_all(&self) -> StoreResult<usize> {
        let mut messages = self.messages.write()?;
        let removed = messages.len();
        messages.clear();
        Ok(removed)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.messages.read()?.len())
    }
}
