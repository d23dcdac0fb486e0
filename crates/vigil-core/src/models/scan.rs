use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted scan status of a file.
///
/// `PendingScan` is the state at upload time. `Clean`, `Infected` and `Error` are terminal
/// for the pipeline, but an operator may reset `Error` back to `PendingScan` to rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "scan_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    PendingScan,
    Clean,
    Infected,
    Error,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 4] = [
        ScanStatus::PendingScan,
        ScanStatus::Clean,
        ScanStatus::Infected,
        ScanStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::PendingScan => "PENDING_SCAN",
            ScanStatus::Clean => "CLEAN",
            ScanStatus::Infected => "INFECTED",
            ScanStatus::Error => "ERROR",
        }
    }
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "PENDING_SCAN" | "PENDING" => Ok(ScanStatus::PendingScan),
            "CLEAN" => Ok(ScanStatus::Clean),
            "INFECTED" => Ok(ScanStatus::Infected),
            "ERROR" => Ok(ScanStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid scan status: {}", s)),
        }
    }
}

/// Outcome carried by a [`ScanResult`]. A result never reports `PENDING_SCAN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Clean,
    Infected,
    Error,
}

impl From<ResultStatus> for ScanStatus {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Clean => ScanStatus::Clean,
            ResultStatus::Infected => ScanStatus::Infected,
            ResultStatus::Error => ScanStatus::Error,
        }
    }
}

impl Display for ResultStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        ScanStatus::from(*self).fmt(f)
    }
}

/// Outcome of one scan attempt, published on the results channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    #[serde(rename = "s3Key", alias = "objectKey")]
    pub object_key: String,
    pub status: ResultStatus,
    /// Present only when `status` is `INFECTED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virus_name: Option<String>,
    /// Present only when `status` is `ERROR`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn clean(object_key: impl Into<String>) -> Self {
        Self::build(object_key.into(), ResultStatus::Clean, None, None)
    }

    pub fn infected(object_key: impl Into<String>, virus_name: impl Into<String>) -> Self {
        Self::build(
            object_key.into(),
            ResultStatus::Infected,
            Some(virus_name.into()),
            None,
        )
    }

    pub fn error(object_key: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self::build(
            object_key.into(),
            ResultStatus::Error,
            None,
            Some(error_message.into()),
        )
    }

    pub fn with_file_id(mut self, file_id: i64) -> Self {
        self.file_id = Some(file_id);
        self
    }

    fn build(
        object_key: String,
        status: ResultStatus,
        virus_name: Option<String>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            file_id: None,
            object_key,
            status,
            virus_name,
            error_message,
            scanned_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_result_wire_format() {
        let result = ScanResult::infected("b", "EICAR").with_file_id(9);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["s3Key"], "b");
        assert_eq!(json["status"], "INFECTED");
        assert_eq!(json["virusName"], "EICAR");
        assert_eq!(json["fileId"], 9);
        assert!(json.get("errorMessage").is_none());
        assert!(json["scannedAt"].is_string());
    }

    #[test]
    fn error_result_carries_message_only() {
        let result = ScanResult::error("k", "boom");
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert!(result.virus_name.is_none());
    }

    #[test]
    fn rejects_pending_status_in_result() {
        let json = r#"{"s3Key":"k","status":"PENDING_SCAN","scannedAt":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<ScanResult>(json).is_err());
    }

    #[test]
    fn scan_status_parses_display_form() {
        for status in ScanStatus::ALL {
            assert_eq!(status.to_string().parse::<ScanStatus>().unwrap(), status);
        }
        assert_eq!("pending".parse::<ScanStatus>().unwrap(), ScanStatus::PendingScan);
    }
}
