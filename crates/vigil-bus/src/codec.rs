//! JSON payload codec shared by producers and consumers

use crate::BusResult;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn encode<T: Serialize>(value: &T) -> BusResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> BusResult<T> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusError;
    use vigil_core::ScanResult;

    #[test]
    fn decode_rejects_garbage() {
        let err = decode::<ScanResult>(b"not json").unwrap_err();
        assert!(matches!(err, BusError::Codec(_)));
    }

    #[test]
    fn encodes_camel_case() {
        let payload = encode(&ScanResult::clean("k1")).unwrap();
        let text = std::str::from_utf8(&payload).unwrap();
        assert!(text.contains("\"s3Key\":\"k1\""));
        assert!(text.contains("\"status\":\"CLEAN\""));
    }
}
