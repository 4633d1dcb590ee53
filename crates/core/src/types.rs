/// Opaque request identifier (UUID v4 string, generated by the coordinator).
pub type RequestId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh request identifier.
pub fn new_request_id() -> RequestId {
    uuid::Uuid::new_v4().to_string()
}
