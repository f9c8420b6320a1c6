//! End-to-end flows through `MessengerAPI`
//!
//! Accounts, handshakes, the request workflow and realtime delivery,
//! wired together the way a server would wire them.

use std::sync::Arc;
use std::time::Duration;

use postern_core::crypto::session::initiate_handshake;
use postern_core::protocol::transport::{DeliveryDispatcher, LocalConnections};
use postern_core::storage::{MemoryStorage, MessageStore};
use postern_core::utils::logging::init_logging;
use postern_core::utils::time::ManualClock;
use postern_core::{
    Config, DecryptionFailure, DeliveryEvent, EncryptionType, MessengerAPI, PosternError, PrimitiveAdapter,
    RequestAction, RequestStatus, SendOutcome,
};

fn fast_config() -> Config {
    Config {
        argon2_memory_kib: 8,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        login_max_attempts: 3,
        private_key_ttl_secs: 600,
        session_key_ttl_secs: 600,
        cache_sweep_interval_secs: 1,
        ..Config::default()
    }
}

struct Harness {
    api: Arc<MessengerAPI>,
    store: Arc<MemoryStorage>,
    clock: Arc<ManualClock>,
}

fn harness_with(config: Config, dispatcher: DeliveryDispatcher) -> Harness {
    init_logging();
    let store = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::starting_now());
    let adapter = PrimitiveAdapter::initialize(true).unwrap();
    let api = MessengerAPI::with_parts(config, adapter, store.clone(), dispatcher, clock.clone()).unwrap();

    Harness {
        api: Arc::new(api),
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(fast_config(), DeliveryDispatcher::disabled())
}

fn transport_only() -> Harness {
    let config = Config {
        message_level_encryption: false,
        ..fast_config()
    };
    harness_with(config, DeliveryDispatcher::disabled())
}

fn connect_session(api: &MessengerAPI, user_id: &str) {
    let adapter = PrimitiveAdapter::initialize(true).unwrap();
    let (ciphertext, _) = initiate_handshake(&adapter, &api.server_public_key()).unwrap();
    api.handshake(user_id, &ciphertext).unwrap();
}

fn register_all(api: &MessengerAPI) {
    for user in ["alice", "bob", "carol"] {
        api.register(user, &format!("{}-pw", user)).unwrap();
        api.login(user, &format!("{}-pw", user)).unwrap();
    }
}

#[test]
fn test_login_with_right_and_wrong_password() {
    let h = harness();
    h.api.register("alice", "P1").unwrap();

    assert_eq!(h.api.login("alice", "P2"), Err(PosternError::AuthenticationFailure));
    assert!(h.api.keys().get_cached_private_key("alice").is_none());

    h.api.login("alice", "P1").unwrap();
    assert!(h.api.keys().get_cached_private_key("alice").is_some());
}

#[test]
fn test_unknown_user_looks_like_wrong_password() {
    let h = harness();
    assert_eq!(h.api.login("nobody", "P1"), Err(PosternError::AuthenticationFailure));
}

#[test]
fn test_login_rate_limit() {
    let h = harness();
    h.api.register("alice", "P1").unwrap();

    for _ in 0..3 {
        assert_eq!(h.api.login("alice", "bad"), Err(PosternError::AuthenticationFailure));
    }
    // Even the right password is refused until the window passes
    assert_eq!(h.api.login("alice", "P1"), Err(PosternError::RateLimited));

    h.clock.advance(chrono::Duration::seconds(61));
    h.api.login("alice", "P1").unwrap();
}

#[test]
fn test_duplicate_registration_rejected() {
    let h = harness();
    h.api.register("alice", "P1").unwrap();
    assert!(matches!(h.api.register("alice", "P1"), Err(PosternError::InvalidInput(_))));
}

#[test]
fn test_handshake_replay_reestablishes_same_key() {
    let h = harness();
    let adapter = PrimitiveAdapter::initialize(true).unwrap();
    let (ciphertext, client_key) = initiate_handshake(&adapter, &h.api.server_public_key()).unwrap();

    h.api.handshake("alice", &ciphertext).unwrap();
    let first = h.api.sessions().get_session_key("alice").unwrap();
    assert_eq!(*first, *client_key);

    h.api.handshake("alice", &ciphertext).unwrap();
    let second = h.api.sessions().get_session_key("alice").unwrap();
    assert_eq!(*first, *second);
}

#[test]
fn test_malformed_handshake_keeps_previous_session() {
    let h = harness();
    let adapter = PrimitiveAdapter::initialize(true).unwrap();
    let (ciphertext, client_key) = initiate_handshake(&adapter, &h.api.server_public_key()).unwrap();
    h.api.handshake("alice", &ciphertext).unwrap();

    assert!(matches!(h.api.handshake("alice", &[0u8; 16]), Err(PosternError::Handshake(_))));
    assert_eq!(*h.api.sessions().get_session_key("alice").unwrap(), *client_key);
}

#[test]
fn test_first_contact_creates_request_then_accept_delivers() {
    let h = harness();
    register_all(&h.api);

    let outcome = h.api.send_message("alice", "bob", "hi bob").unwrap();
    let request = match outcome {
        SendOutcome::RequestCreated(request) => request,
        other => panic!("expected a request, got {:?}", other),
    };
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(h.api.pending_requests("bob").unwrap().len(), 1);
    assert!(h.api.read_conversation("bob", "alice").unwrap().is_empty());

    let accepted = h.api.resolve_request(&request.id, "bob", RequestAction::Accept).unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);

    let conversation = h.api.read_conversation("bob", "alice").unwrap();
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].id, request.id);
    assert_eq!(conversation[0].content.as_deref(), Ok("hi bob"));

    // Contacts now message freely in both directions
    assert!(h.api.send_message("alice", "bob", "second").unwrap().is_delivered());
    assert!(h.api.send_message("bob", "alice", "reply").unwrap().is_delivered());

    let alice_view = h.api.read_conversation("alice", "bob").unwrap();
    assert_eq!(alice_view.len(), 3);
    assert_eq!(alice_view[2].content.as_deref(), Ok("reply"));
}

#[test]
fn test_decline_then_new_request_allowed() {
    let h = harness();
    register_all(&h.api);

    let first = h.api.send_message("carol", "bob", "hello").unwrap();
    let declined = h.api.resolve_request(first.id(), "bob", RequestAction::Decline).unwrap();
    assert_eq!(declined.status, RequestStatus::Declined);

    // A declined request can't be reopened
    assert!(matches!(
        h.api.resolve_request(first.id(), "bob", RequestAction::Accept),
        Err(PosternError::InvalidTransition { .. })
    ));

    let second = h.api.send_message("carol", "bob", "please").unwrap();
    assert!(!second.is_delivered());
    assert_ne!(second.id(), first.id());
    assert_eq!(h.api.pending_requests("bob").unwrap().len(), 1);
}

#[test]
fn test_second_pending_request_is_duplicate() {
    let h = harness();
    register_all(&h.api);

    h.api.send_message("alice", "carol", "one").unwrap();
    assert_eq!(
        h.api.send_message("alice", "carol", "two"),
        Err(PosternError::DuplicateRequest)
    );
}

#[test]
fn test_only_recipient_resolves_request() {
    let h = harness();
    register_all(&h.api);

    let outcome = h.api.send_message("alice", "bob", "hi").unwrap();
    assert_eq!(
        h.api.resolve_request(outcome.id(), "alice", RequestAction::Accept),
        Err(PosternError::Forbidden)
    );
    assert_eq!(
        h.api.resolve_request(outcome.id(), "carol", RequestAction::Accept),
        Err(PosternError::Forbidden)
    );
}

#[test]
fn test_concurrent_first_contact_creates_one_request() {
    let h = harness();
    register_all(&h.api);

    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let api = h.api.clone();
                scope.spawn(move || api.send_message("alice", "bob", &format!("msg {}", i)))
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let created = outcomes.iter().filter(|o| o.is_ok()).count();
    let duplicates = outcomes
        .iter()
        .filter(|o| matches!(o, Err(PosternError::DuplicateRequest)))
        .count();
    assert_eq!(created, 1);
    assert_eq!(duplicates, 5);
    assert_eq!(h.store.pending_requests_for("bob").unwrap().len(), 1);
}

#[test]
fn test_logout_makes_messages_unreadable_until_login() {
    let h = harness();
    register_all(&h.api);

    let outcome = h.api.send_message("alice", "bob", "secret").unwrap();
    h.api.resolve_request(outcome.id(), "bob", RequestAction::Accept).unwrap();

    h.api.logout("bob");
    let locked = h.api.read_conversation("bob", "alice").unwrap();
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].content, Err(DecryptionFailure::KeyNotCached));
    assert_eq!(locked[0].encryption_type, EncryptionType::MessagePq);

    h.api.login("bob", "bob-pw").unwrap();
    let unlocked = h.api.read_conversation("bob", "alice").unwrap();
    assert_eq!(unlocked[0].content.as_deref(), Ok("secret"));
}

#[test]
fn test_transport_messages_readable_by_recipient() {
    let h = transport_only();
    register_all(&h.api);
    connect_session(&h.api, "alice");
    connect_session(&h.api, "bob");

    let first = h.api.send_message("alice", "bob", "hello").unwrap();
    h.api.resolve_request(first.id(), "bob", RequestAction::Accept).unwrap();
    assert!(h.api.send_message("alice", "bob", "again").unwrap().is_delivered());

    let bob_view = h.api.read_conversation("bob", "alice").unwrap();
    assert_eq!(bob_view.len(), 2);
    assert!(bob_view.iter().all(|m| m.encryption_type == EncryptionType::Transport));
    assert_eq!(bob_view[0].content.as_deref(), Ok("hello"));
    assert_eq!(bob_view[1].content.as_deref(), Ok("again"));

    let alice_view = h.api.read_conversation("alice", "bob").unwrap();
    assert_eq!(alice_view[1].content.as_deref(), Ok("again"));
}

#[test]
fn test_transport_message_after_sender_logout_is_not_forged() {
    let h = transport_only();
    register_all(&h.api);
    connect_session(&h.api, "alice");
    connect_session(&h.api, "bob");

    let first = h.api.send_message("alice", "bob", "hello").unwrap();
    h.api.resolve_request(first.id(), "bob", RequestAction::Accept).unwrap();

    h.api.logout("alice");
    let view = h.api.read_conversation("bob", "alice").unwrap();
    assert_eq!(view[0].content, Err(DecryptionFailure::KeyNotCached));

    h.api.logout("bob");
    connect_session(&h.api, "alice");
    let view = h.api.read_conversation("bob", "alice").unwrap();
    assert_eq!(view[0].content, Err(DecryptionFailure::KeyNotCached));
}

#[test]
fn test_cached_key_expires() {
    let h = harness();
    register_all(&h.api);

    let outcome = h.api.send_message("alice", "bob", "later").unwrap();
    h.api.resolve_request(outcome.id(), "bob", RequestAction::Accept).unwrap();

    h.clock.advance(chrono::Duration::seconds(601));
    let view = h.api.read_conversation("bob", "alice").unwrap();
    assert_eq!(view[0].content, Err(DecryptionFailure::KeyNotCached));
    assert!(h.api.sweep_expired() >= 1);
}

#[test]
fn test_clear_after_unlock_wins() {
    let h = harness();
    h.api.register("alice", "P1").unwrap();

    h.api.login("alice", "P1").unwrap();
    h.api.logout("alice");
    assert!(h.api.keys().get_cached_private_key("alice").is_none());
    assert_eq!(h.api.keys().cached_count(), 0);
}

#[test]
fn test_delete_user_removes_keys() {
    let h = harness();
    h.api.register("alice", "P1").unwrap();
    h.api.delete_user("alice").unwrap();

    assert!(matches!(h.api.public_key("alice"), Err(PosternError::NotFound(_))));
    assert_eq!(h.api.login("alice", "P1"), Err(PosternError::AuthenticationFailure));
}

#[test]
fn test_displayed_message_json_hides_failures() {
    let h = harness();
    register_all(&h.api);

    let outcome = h.api.send_message("alice", "bob", "json").unwrap();
    h.api.resolve_request(outcome.id(), "bob", RequestAction::Accept).unwrap();
    h.api.logout("bob");

    let view = h.api.read_conversation("bob", "alice").unwrap();
    let json = serde_json::to_value(&view[0]).unwrap();
    assert!(json["content"].is_null());
    assert_eq!(json["encryption_type"], "message_pq");
}

#[tokio::test]
async fn test_realtime_delivery_reaches_connected_users() {
    init_logging();
    let connections = Arc::new(LocalConnections::new());
    let store = Arc::new(MemoryStorage::new());
    let config = Config {
        delivery_queue_capacity: 8,
        delivery_timeout_ms: 500,
        ..fast_config()
    };
    let (api, _worker) = MessengerAPI::with_notifier(config, store, connections.clone()).unwrap();
    register_all(&api);

    let mut alice_rx = connections.connect("alice");
    let mut bob_rx = connections.connect("bob");

    let outcome = api.send_message("alice", "bob", "ping").unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), bob_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        DeliveryEvent::NewRequest(payload) => {
            assert_eq!(payload.request_id, outcome.id());
            assert_eq!(payload.sender_id, "alice");
            assert_eq!(payload.status, RequestStatus::Pending);
        }
        other => panic!("unexpected event {:?}", other),
    }

    api.resolve_request(outcome.id(), "bob", RequestAction::Accept).unwrap();

    for rx in [&mut bob_rx, &mut alice_rx] {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), "new_message");
    }
}

#[tokio::test]
async fn test_sweeper_stops_when_api_dropped() {
    let h = harness();
    let handle = h.api.spawn_default_sweeper();
    drop(h);

    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .unwrap()
        .unwrap();
}
