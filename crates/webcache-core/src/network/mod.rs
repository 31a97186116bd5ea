//! HTTP transport abstraction and the default reqwest-backed client.

mod client;

pub use client::{extract_domain, HttpClient, HttpTransport};
