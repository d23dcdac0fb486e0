use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Object storage backend types
///
/// Defined in core because configuration selects it before any storage crate is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Message transport backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    Kafka,
    Memory,
}

impl FromStr for BusBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kafka" => Ok(BusBackend::Kafka),
            "memory" => Ok(BusBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid bus backend: {}", s)),
        }
    }
}

impl Display for BusBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BusBackend::Kafka => write!(f, "kafka"),
            BusBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Persisted file status store types
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusStoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StatusStoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StatusStoreBackend::Postgres),
            "memory" => Ok(StatusStoreBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid status store: {}", s)),
        }
    }
}

impl Display for StatusStoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StatusStoreBackend::Postgres => write!(f, "postgres"),
            StatusStoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backends_case_insensitive() {
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!("Kafka".parse::<BusBackend>().unwrap(), BusBackend::Kafka);
        assert_eq!(
            "postgresql".parse::<StatusStoreBackend>().unwrap(),
            StatusStoreBackend::Postgres
        );
        assert!("nfs".parse::<StorageBackend>().is_err());
    }
}
