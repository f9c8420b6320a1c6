// Persistence boundary
//
// The core treats the store as an external collaborator. `MemoryStorage` is
// the in-process implementation used by tests and single-node deployments.

pub mod memory;
pub mod models;

use crate::utils::error::Result;
use models::{IdentityKeyPair, MessageRequest, RequestStatus, StoredMessage};

pub use memory::MemoryStorage;

/// Strongly consistent store for keys, messages and requests.
pub trait MessageStore: Send + Sync {
    // === Keys ===

    fn save_user_keys(&self, keys: IdentityKeyPair) -> Result<()>;

    fn get_user_keys(&self, user_id: &str) -> Result<Option<IdentityKeyPair>>;

    fn get_user_public_key(&self, user_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_user_keys(user_id)?.map(|keys| keys.public_key))
    }

    fn delete_user_keys(&self, user_id: &str) -> Result<()>;

    // === Messages ===

    fn save_message(&self, message: StoredMessage) -> Result<()>;

    fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>>;

    /// Messages exchanged between `a` and `b` in either direction, oldest first.
    fn messages_between(&self, a: &str, b: &str) -> Result<Vec<StoredMessage>>;

    // === Requests ===

    /// Persists a new pending request.
    ///
    /// Fails with `DuplicateRequest` if a pending request from the same sender
    /// to the same recipient already exists. The check and the insert are one
    /// atomic step.
    fn save_request(&self, request: MessageRequest) -> Result<()>;

    fn get_request(&self, request_id: &str) -> Result<Option<MessageRequest>>;

    /// Compare-and-set on the request status.
    ///
    /// Fails with `NotFound` for an unknown id and with `InvalidTransition`
    /// when the stored status is not `expected` or the move is illegal.
    fn update_request_status(
        &self,
        request_id: &str,
        expected: RequestStatus,
        new_status: RequestStatus,
    ) -> Result<MessageRequest>;

    fn find_pending_request(&self, sender_id: &str, recipient_id: &str) -> Result<Option<MessageRequest>>;

    /// Pending requests addressed to `recipient_id`, oldest first.
    fn pending_requests_for(&self, recipient_id: &str) -> Result<Vec<MessageRequest>>;

    // === Relations ===

    fn record_accepted_relation(&self, a: &str, b: &str) -> Result<()>;

    fn has_accepted_relation(&self, a: &str, b: &str) -> Result<bool>;
}
