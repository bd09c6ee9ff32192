//! Storage for received messages.
//!
//! Sessions only ever call [`MessageStore::create`]. The remaining operations
//! exist for whatever presents the collected mail.

mod memory;

use async_trait::async_trait;
pub use memory::MemoryMessageStore;

use crate::{
    error::StoreResult,
    message::{MessageId, MessageRecord, MessageStatus, StoredMessage},
};

/// A thread-safe message store shared by every session.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Persist `record`, assigning its identifier and receipt time.
    async fn create(&self, record: MessageRecord) -> StoreResult<MessageId>;

    async fn get(&self, id: MessageId) -> StoreResult<StoredMessage>;

    /// Every message, most recently received first.
    async fn list(&self) -> StoreResult<Vec<StoredMessage>>;

    async fn update_status(&self, id: MessageId, status: MessageStatus) -> StoreResult<()>;

    /// Remove every message, returning how many were removed.
    async fn delete_all(&self) -> StoreResult<usize>;

    async fn count(&self) -> StoreResult<usize>;
}
