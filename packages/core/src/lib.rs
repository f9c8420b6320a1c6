// Postern Core
// Post-quantum transport security and message-request workflow for a messaging service

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

// Modules
pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod utils;

// Re-exports
pub use api::contacts::SendOutcome;
pub use api::{DisplayedMessage, MessengerAPI};
pub use config::Config;
pub use crypto::{PrimitiveAdapter, SecurityLevel};
pub use protocol::{DeliveryEvent, EncryptionType, WireMessage};
pub use storage::models::{MessageRequest, RequestAction, RequestStatus};
pub use utils::error::{DecryptionFailure, PosternError, Result};
