/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque execution identifier returned by the remote tool.
pub type ExecutionId = String;
