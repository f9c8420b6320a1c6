// Protocol: message bodies, wire framing, realtime delivery

pub mod messages;
pub mod transport;
pub mod wire;

pub use messages::{DeliveryEvent, EncryptionType, WireMessage};
pub use transport::{DeliveryDispatcher, LocalConnections, Notifier};
