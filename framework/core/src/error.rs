/// HTTP status returned by endpoints that are shedding load.
pub const RATE_LIMITED_STATUS: u16 = 429;

/// A single request that did not produce a usable response.
///
/// These are recorded as failed operations by the metrics. The engine never retries a failed
/// request itself, if a retry policy is wanted it belongs in the [crate::prelude::Requester].
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    #[display("request timed out: {message}")]
    Timeout { message: String },
    #[display("connection error: {message}")]
    Connection { message: String },
    #[display("http error {status}: {message}")]
    Http { status: u16, message: String },
}

impl RequestFailure {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// A 429 response. These feed the shared rate limit counter that drives backpressure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Http { status, .. } if *status == RATE_LIMITED_STATUS)
    }

    /// Short classification label, used as a tag when failures are grouped.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::Http { .. } if self.is_rate_limited() => "rate_limited",
            Self::Http { .. } => "http",
        }
    }
}

/// A discovery stage could not complete.
///
/// Never fatal. The stage is skipped and later stages run against whatever state has been
/// discovered so far.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone)]
#[display("discovery stage [{stage}] failed: {message}")]
pub struct DiscoveryFailure {
    stage: String,
    message: String,
}

impl DiscoveryFailure {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn from_request(stage: impl Into<String>, failure: &RequestFailure) -> Self {
        Self::new(stage, failure.to_string())
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A response body could not be fingerprinted. Logged and dropped, it must not affect the run.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone)]
#[display("pattern analysis failed for [{endpoint}]: {message}")]
pub struct PatternAnalysisFailure {
    endpoint: String,
    message: String,
}

impl PatternAnalysisFailure {
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_429_is_rate_limited() {
        assert!(RequestFailure::http(429, "Too Many Requests").is_rate_limited());
        assert!(!RequestFailure::http(503, "Service Unavailable").is_rate_limited());
        assert!(!RequestFailure::timeout("10s elapsed").is_rate_limited());
        assert!(!RequestFailure::connection("refused").is_rate_limited());
    }

    #[test]
    fn failure_kinds() {
        assert_eq!("rate_limited", RequestFailure::http(429, "").kind());
        assert_eq!("http", RequestFailure::http(500, "").kind());
        assert_eq!("timeout", RequestFailure::timeout("").kind());
        assert_eq!("connection", RequestFailure::connection("").kind());
    }

    #[test]
    fn display_includes_status() {
        let failure = RequestFailure::http(502, "Bad Gateway");
        assert_eq!("http error 502: Bad Gateway", failure.to_string());

        let failure = DiscoveryFailure::from_request("chain-info", &failure);
        assert_eq!(
            "discovery stage [chain-info] failed: http error 502: Bad Gateway",
            failure.to_string()
        );
    }
}
