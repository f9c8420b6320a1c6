// Shared helpers

pub mod b64;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod time;
pub mod uuid;
