use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Longest response body kept from a rejected probe.
pub const MAX_ERROR_BODY_BYTES: usize = 4096;

/// Why an outbound request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Timeout,
    ConnectionRefused,
    DnsFailure,
    Unknown,
}

impl FailureCause {
    pub fn code(&self) -> &'static str {
        match self {
            FailureCause::Timeout => "timeout",
            FailureCause::ConnectionRefused => "connection_refused",
            FailureCause::DnsFailure => "dns_failure",
            FailureCause::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// The upstream answered with a non-2xx status.
    #[error("responded with status {status}")]
    Status { status: u16, body: String },

    /// The hard deadline elapsed and the request was dropped.
    #[error("did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("request failed ({cause}): {message}")]
    Transport { cause: FailureCause, message: String },
}

impl ProbeError {
    /// Short machine-readable reason: the failure cause code, or the raw
    /// transport message when the cause could not be classified.
    pub fn details(&self) -> String {
        match self {
            ProbeError::Status { status, .. } => format!("status_{}", status),
            ProbeError::Timeout(_) => FailureCause::Timeout.code().to_string(),
            ProbeError::Transport { cause: FailureCause::Unknown, message } => message.clone(),
            ProbeError::Transport { cause, .. } => cause.code().to_string(),
        }
    }
}

/// A single bounded GET against an upstream dependency. No retries.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)], timeout: Duration) -> Result<(), ProbeError>;
}

/// `HttpProbe` backed by a shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &str, headers: &[(&str, &str)], timeout: Duration) -> Result<(), ProbeError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let attempt = async {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = read_capped_body(response).await;
            Err::<(), ProbeError>(ProbeError::Status { status: status.as_u16(), body })
        };

        // Dropping `attempt` on deadline cancels the in-flight request
        let result = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        match &result {
            Ok(()) => debug!(url = %url, "Probe succeeded"),
            Err(e) => warn!(url = %url, error = %e, "Probe failed"),
        }
        result
    }
}

/// Read at most `MAX_ERROR_BODY_BYTES` of the body; the rest is never buffered.
async fn read_capped_body(mut response: reqwest::Response) -> String {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < MAX_ERROR_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = MAX_ERROR_BODY_BYTES - buf.len();
                buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed to read error body");
                break;
            }
        }
    }
    truncate_utf8(&buf)
}

/// Decode, dropping a multi-byte character split by the cap.
fn truncate_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) if e.error_len().is_none() => {
            String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned()
        }
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn transport_error(err: reqwest::Error) -> ProbeError {
    ProbeError::Transport { cause: classify(&err), message: err.to_string() }
}

/// Walk the error chain to find out why no response arrived.
pub fn classify(err: &reqwest::Error) -> FailureCause {
    if err.is_timeout() {
        return FailureCause::Timeout;
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return FailureCause::ConnectionRefused,
                io::ErrorKind::TimedOut => return FailureCause::Timeout,
                _ => {}
            }
        }
        if is_dns_error(current) {
            return FailureCause::DnsFailure;
        }
        source = current.source();
    }

    FailureCause::Unknown
}

// hyper-util reports resolver failures as a `ConnectError` whose text starts
// with "dns error"; the type itself is private.
fn is_dns_error(err: &(dyn StdError + 'static)) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    text.starts_with("dns error") || text.contains("failed to lookup address")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_prefer_cause_codes() {
        assert_eq!(ProbeError::Timeout(Duration::from_millis(5)).details(), "timeout");
        let refused = ProbeError::Transport {
            cause: FailureCause::ConnectionRefused,
            message: "error sending request".into(),
        };
        assert_eq!(refused.details(), "connection_refused");
        let unknown = ProbeError::Transport {
            cause: FailureCause::Unknown,
            message: "builder error".into(),
        };
        assert_eq!(unknown.details(), "builder error");
    }

    #[test]
    fn test_split_character_is_dropped() {
        let text = "héllo";
        assert_eq!(truncate_utf8(&text.as_bytes()[..2]), "h");
        assert_eq!(truncate_utf8(text.as_bytes()), "héllo");
    }

    #[test]
    fn test_timeout_message_mentions_deadline() {
        let err = ProbeError::Timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "did not respond within 50ms");
    }

    #[tokio::test]
    async fn test_invalid_url_is_unknown_transport_failure() {
        let probe = ReqwestProbe::default();
        let err = probe
            .get("not a url", &[], Duration::from_millis(100))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ProbeError::Transport { cause: FailureCause::Unknown, .. }));
    }
}
