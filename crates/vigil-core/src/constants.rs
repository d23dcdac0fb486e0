//! Error messages carried inside ERROR scan results and log lines.
//!
//! The result messages are part of the wire contract with the upload service,
//! which surfaces them to operators.

// === Object storage ===
pub const S3_SERVICE_UNAVAILABLE: &str = "S3 service unavailable";
pub const S3_READ_FAILED: &str = "S3 read failed";

// === Scan engine ===
pub const CLAMAV_UNAVAILABLE: &str = "ClamAV service unavailable";
pub const CLAMAV_UNKNOWN_RESULT: &str = "Unknown scan result type";

// === Dead letter ===
pub const DLQ_SCAN_FAILED: &str = "File scan failed after multiple retry attempts";
