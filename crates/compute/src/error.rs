//! Errors from the compute provider layer.

/// Errors that can occur while talking to the generation service.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service answered 2xx but the body was not in the documented
    /// shape. Treated as a remote failure by callers, never retried.
    #[error("unrecognized provider response: {0}")]
    Decode(String),

    /// The service does not know the handle we are polling. The work is
    /// unrecoverable.
    #[error("unknown job handle: {0}")]
    UnknownHandle(String),
}

impl ComputeError {
    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Network-level failures and server-side (5xx) errors are
    /// transient; client errors, undecodable bodies, and unknown
    /// handles are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ComputeError::Request(_) => true,
            ComputeError::Api { status, .. } => *status >= 500,
            ComputeError::Decode(_) => false,
            ComputeError::UnknownHandle(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = ComputeError::Api {
            status: 503,
            body: "overloaded".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = ComputeError::Api {
            status: 422,
            body: "bad input".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn decode_and_unknown_handle_are_permanent() {
        assert!(!ComputeError::Decode("not json".into()).is_transient());
        assert!(!ComputeError::UnknownHandle("h-1".into()).is_transient());
    }
}
