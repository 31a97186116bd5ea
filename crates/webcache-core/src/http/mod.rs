//! HTTP response buffering, wire encoding and request keys.

mod key;
mod response;

pub use key::request_key;
pub use response::CachedResponse;
