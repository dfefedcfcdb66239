/// Backend server identifiers are 64-bit integers.
pub type ServerId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
