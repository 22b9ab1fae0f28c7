//! Client and error identifiers.
//!
//! Each tracer gets a random client id for its lifetime. Error ids are name-based
//! (UUID v5) with the client id as namespace, so the same payload captured by the
//! same client always maps to the same id and consumers can de-duplicate on it.

use crate::error::Result;
use crate::event::HostEvent;
use uuid::Uuid;

/// Generate a fresh per-session client id
pub fn new_client_id() -> Uuid {
    Uuid::new_v4()
}

/// Derive the deterministic id of an error from its serialized content
pub fn derive_error_id(serialized_error: &str, client_id: &Uuid) -> Uuid {
    Uuid::new_v5(client_id, serialized_error.as_bytes())
}

/// Serialize an event into the canonical form used for [`derive_error_id`]
pub fn serialize_error(event: &HostEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}
