// Request / delivery state machine
//
// Per ordered pair (sender, recipient):
//
//   NoRelation -> Pending -> Accepted | Declined
//
// An accepted request opens the pair in both directions for good. A declined
// one closes nothing: the next send opens a fresh pending request.

use crate::protocol::messages::{DeliveryEvent, NewMessagePayload, NewRequestPayload, WireMessage};
use crate::protocol::transport::DeliveryDispatcher;
use crate::storage::models::{MessageRequest, RequestAction, RequestStatus, StoredMessage, UserPair};
use crate::storage::MessageStore;
use crate::utils::error::{PosternError, Result};
use crate::utils::time::Clock;
use crate::utils::uuid;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// What `send` did with the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered(StoredMessage),
    RequestCreated(MessageRequest),
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered(_))
    }

    pub fn id(&self) -> &str {
        match self {
            SendOutcome::Delivered(message) => &message.id,
            SendOutcome::RequestCreated(request) => &request.id,
        }
    }
}

pub struct RequestManager {
    store: Arc<dyn MessageStore>,
    dispatcher: DeliveryDispatcher,
    clock: Arc<dyn Clock>,
    pair_locks: DashMap<UserPair, Arc<Mutex<()>>>,
}

impl RequestManager {
    pub fn new(store: Arc<dyn MessageStore>, dispatcher: DeliveryDispatcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            pair_locks: DashMap::new(),
        }
    }

    fn pair_lock(&self, a: &str, b: &str) -> Arc<Mutex<()>> {
        self.pair_locks.entry(UserPair::new(a, b)).or_default().clone()
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Delivers `body` directly if the pair has an accepted relation,
    /// otherwise opens a pending request.
    ///
    /// # Errors
    ///
    /// `DuplicateRequest` if `sender_id` already has a pending request to
    /// `recipient_id`.
    pub fn send(&self, sender_id: &str, recipient_id: &str, body: WireMessage) -> Result<SendOutcome> {
        if sender_id.is_empty() || recipient_id.is_empty() {
            return Err(PosternError::InvalidInput("empty user id".to_string()));
        }
        if sender_id == recipient_id {
            return Err(PosternError::InvalidInput(
                "cannot send a message to yourself".to_string(),
            ));
        }

        let lock = self.pair_lock(sender_id, recipient_id);
        let _guard = lock.lock();

        let id = uuid::generate_v4();
        let timestamp = self.now_millis();

        if self.store.has_accepted_relation(sender_id, recipient_id)? {
            let message = StoredMessage {
                id,
                sender_id: sender_id.to_string(),
                recipient_id: recipient_id.to_string(),
                timestamp,
                body,
            };
            self.store.save_message(message.clone())?;

            debug!(target: "api::contacts", message_id = %message.id, sender_id, recipient_id, "message delivered");
            self.dispatcher.dispatch(recipient_id, new_message_event(&message));
            return Ok(SendOutcome::Delivered(message));
        }

        if self.store.find_pending_request(sender_id, recipient_id)?.is_some() {
            debug!(target: "api::contacts", sender_id, recipient_id, "duplicate pending request");
            return Err(PosternError::DuplicateRequest);
        }

        let request = MessageRequest {
            id,
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            body,
            timestamp,
            status: RequestStatus::Pending,
        };
        self.store.save_request(request.clone())?;

        info!(target: "api::contacts", request_id = %request.id, sender_id, recipient_id, "message request created");
        self.dispatcher.dispatch(recipient_id, new_request_event(&request));
        Ok(SendOutcome::RequestCreated(request))
    }

    /// Accepts or declines a pending request. Only its recipient may act.
    ///
    /// # Errors
    ///
    /// `Forbidden` for anyone but the recipient, `InvalidTransition` if the
    /// request is no longer pending, `NotFound` for an unknown id.
    pub fn resolve_request(&self, request_id: &str, actor_id: &str, action: RequestAction) -> Result<MessageRequest> {
        if !uuid::is_valid(request_id) {
            return Err(PosternError::InvalidInput(format!(
                "malformed request id {}",
                request_id
            )));
        }

        let request = self
            .store
            .get_request(request_id)?
            .ok_or_else(|| PosternError::NotFound(format!("request {}", request_id)))?;

        if request.recipient_id != actor_id {
            debug!(target: "api::contacts", request_id, actor_id, "resolve refused: not the recipient");
            return Err(PosternError::Forbidden);
        }

        let lock = self.pair_lock(&request.sender_id, &request.recipient_id);
        let _guard = lock.lock();

        let resolved = self
            .store
            .update_request_status(request_id, RequestStatus::Pending, action.target_status())?;

        match action {
            RequestAction::Accept => {
                self.store
                    .record_accepted_relation(&resolved.sender_id, &resolved.recipient_id)?;

                let message = resolved.to_message();
                self.store.save_message(message.clone())?;

                let event = new_message_event(&message);
                self.dispatcher.dispatch(&resolved.recipient_id, event.clone());
                self.dispatcher.dispatch(&resolved.sender_id, event);
            }
            RequestAction::Decline => {
                self.dispatcher
                    .dispatch(&resolved.sender_id, new_request_event(&resolved));
            }
        }

        info!(
            target: "api::contacts",
            request_id,
            status = ?resolved.status,
            "message request resolved"
        );
        Ok(resolved)
    }

    pub fn pending_for(&self, recipient_id: &str) -> Result<Vec<MessageRequest>> {
        self.store.pending_requests_for(recipient_id)
    }

    pub fn has_relation(&self, a: &str, b: &str) -> Result<bool> {
        self.store.has_accepted_relation(a, b)
    }
}

fn new_message_event(message: &StoredMessage) -> DeliveryEvent {
    DeliveryEvent::NewMessage(NewMessagePayload {
        message_id: message.id.clone(),
        sender_id: message.sender_id.clone(),
        recipient_id: message.recipient_id.clone(),
        timestamp: message.timestamp,
        body: message.body.clone(),
    })
}

fn new_request_event(request: &MessageRequest) -> DeliveryEvent {
    DeliveryEvent::NewRequest(NewRequestPayload {
        request_id: request.id.clone(),
        sender_id: request.sender_id.clone(),
        recipient_id: request.recipient_id.clone(),
        timestamp: request.timestamp,
        status: request.status,
    })
}
