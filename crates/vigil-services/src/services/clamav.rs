use crate::services::engine::{EngineError, EngineVerdict, ScanEngine};
use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use std::time::{Duration, Instant};
use vigil_core::ClamAvConfig;

/// clamd client speaking INSTREAM over TCP
#[derive(Clone)]
pub struct ClamAVService {
    host: String,
    port: u16,
    /// Timeout in seconds for each scan operation (default: 30)
    timeout_secs: u64,
}

impl ClamAVService {
    /// Create a new ClamAVService.
    ///
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, 30)
    }

    /// Create with a custom scan timeout (for large files or slow ClamAV instances).
    pub fn with_timeout(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
        }
    }

    pub fn from_config(config: &ClamAvConfig) -> Self {
        Self::with_timeout(config.host.clone(), config.port, config.timeout_secs)
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check that clamd answers PING
    pub async fn ping(&self) -> Result<(), EngineError> {
        let address = self.address();
        let response = tokio::task::spawn_blocking(move || {
            clamav_client::ping(Tcp {
                host_address: address.as_str(),
            })
        })
        .await
        .map_err(|e| EngineError::Unavailable(format!("ping task join error: {}", e)))?
        .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        let text = String::from_utf8_lossy(&response);
        if text.trim_end_matches('\0').trim() == "PONG" {
            Ok(())
        } else {
            Err(EngineError::Unavailable(format!(
                "unexpected PING response: {}",
                text.trim()
            )))
        }
    }
}

/// Classify a raw clamd response.
///
/// `stream: OK` is clean. Every `<name> FOUND` line contributes a signature name in the
/// order reported. Anything else is unrecognised.
pub fn parse_response(response: &[u8]) -> EngineVerdict {
    let text = String::from_utf8_lossy(response);
    let lines: Vec<&str> = text
        .split(['\0', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let names: Vec<String> = lines
        .iter()
        .filter_map(|line| line.strip_suffix("FOUND"))
        .map(|rest| {
            // "stream: Eicar-Signature " -> "Eicar-Signature"
            let rest = rest.trim_end();
            rest.rsplit_once(": ")
                .map(|(_, name)| name)
                .unwrap_or(rest)
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect();
    if !names.is_empty() {
        return EngineVerdict::Infected(names);
    }

    match clean(response) {
        Ok(true) => EngineVerdict::Clean,
        _ => EngineVerdict::Unrecognized(lines.join(" | ")),
    }
}

#[async_trait]
impl ScanEngine for ClamAVService {
    /// Scan in-memory data using sync API inside spawn_blocking to avoid !Send tokio futures.
    async fn scan(&self, data: Vec<u8>) -> Result<EngineVerdict, EngineError> {
        let start = Instant::now();
        tracing::debug!(
            host = %self.host,
            port = %self.port,
            size_bytes = data.len(),
            "Starting ClamAV scan"
        );
        let address = self.address();

        let timeout_secs = self.timeout_secs;
        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::task::spawn_blocking(move || {
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                clamav_client::scan_buffer(data.as_slice(), connection, None)
            }),
        )
        .await;

        let response = match result {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "ClamAV scan failed");
                return Err(EngineError::Unavailable(format!("ClamAV scan error: {}", e)));
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "ClamAV scan panicked");
                return Err(EngineError::Unavailable(format!(
                    "ClamAV scan task join error: {}",
                    e
                )));
            }
            Err(_) => {
                let error_msg = format!("ClamAV scan timeout (exceeded {} seconds)", timeout_secs);
                tracing::error!(error = %error_msg, "ClamAV scan timeout");
                return Err(EngineError::Unavailable(error_msg));
            }
        };

        let verdict = parse_response(&response);
        match &verdict {
            EngineVerdict::Clean => tracing::info!(
                duration_ms = start.elapsed().as_millis(),
                "File scan completed: clean"
            ),
            EngineVerdict::Infected(names) => tracing::warn!(
                duration_ms = start.elapsed().as_millis(),
                virus = %names.join(", "),
                "File scan detected virus"
            ),
            EngineVerdict::Unrecognized(raw) => tracing::error!(
                duration_ms = start.elapsed().as_millis(),
                response = %raw,
                "Unrecognized ClamAV response"
            ),
        }
        Ok(verdict)
    }
}
