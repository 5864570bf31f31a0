//! HTTP transport for the stats API.
//!
//! `Transport` is the seam between the sync coordinator and the network:
//! the production `HttpTransport` speaks JSON-over-HTTPS with conditional
//! fetch (`If-None-Match` / `ETag`), and tests substitute a fake. The
//! transport never touches the conditional cache or the offline store —
//! that is the coordinator's job.

pub mod error;
pub mod transport;

pub use error::TransportError;
pub use transport::{FetchOutcome, FetchRequest, HttpTransport, Method, Transport};

use serde::de::DeserializeOwned;

/// Outcome of decoding a response body.
///
/// Malformed payloads are a first-class value, not a silently-defaulted
/// one: the caller decides what a bad body means for its cache.
#[derive(Debug)]
pub enum Decoded<T> {
    Parsed(T),
    Malformed { reason: String },
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Decoded<T> {
    match serde_json::from_slice::<T>(bytes) {
        Ok(value) => Decoded::Parsed(value),
        Err(err) => Decoded::Malformed {
            reason: err.to_string(),
        },
    }
}
