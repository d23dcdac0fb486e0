use serde::{Deserialize, Serialize};

/// Notification that a file was uploaded and must be scanned.
///
/// Published by the upload path, consumed by the scan worker and re-published verbatim
/// by dead-letter reconciliation. Field names follow the upload service's JSON contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub file_id: i64,
    pub user_id: i64,
    /// Unique storage key, stable for the file's lifetime
    #[serde(rename = "s3Key", alias = "objectKey")]
    pub object_key: String,
    pub bucket_name: String,
    pub original_file_name: String,
}

impl UploadEvent {
    /// Message key used on the upload channel. The upload path keys by file id, so
    /// republished events land on the same partition as the original.
    pub fn message_key(&self) -> String {
        self.file_id.to_string()
    }
}
