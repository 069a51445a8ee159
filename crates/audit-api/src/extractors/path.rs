//! Path parameter extractors

use audit_core::EventId;
use serde::Deserialize;

use crate::response::ApiError;

/// Path parameters with event_id
#[derive(Debug, Deserialize)]
pub struct EventIdPath {
    pub event_id: String,
}

impl EventIdPath {
    /// Parse event_id as an EventId
    pub fn event_id(&self) -> Result<EventId, ApiError> {
        self.event_id
            .parse()
            .map_err(|_| ApiError::invalid_path("Invalid event_id format"))
    }
}
