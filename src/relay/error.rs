//! Session-scoped relay errors.

use axum::http::StatusCode;

/// Why a relay session ended abnormally.
///
/// Every variant is local to one session; none of them stop the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Method or path does not match the configured upgrade route.
    #[error("{method} {path} does not match the upgrade route")]
    PathRejected { method: String, path: String },

    /// A header the handshake policy needs is missing or wrong.
    #[error("malformed upgrade handshake: {0}")]
    HandshakeMalformed(&'static str),

    /// Dialing or handshaking with the backend failed.
    #[error("backend {addr} unreachable: {source}")]
    BackendUnreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A socket failed after piping started.
    #[error("stream failed after {client_to_backend}B up / {backend_to_client}B down: {source}")]
    MidStreamIo {
        #[source]
        source: std::io::Error,
        client_to_backend: u64,
        backend_to_client: u64,
    },
}

impl RelayError {
    /// Status to send the client, when the handshake has not completed yet.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RelayError::PathRejected { .. } => Some(StatusCode::NOT_FOUND),
            RelayError::HandshakeMalformed(_) => Some(StatusCode::BAD_REQUEST),
            RelayError::BackendUnreachable { .. } => Some(StatusCode::BAD_GATEWAY),
            RelayError::MidStreamIo { .. } => None,
        }
    }

    /// Metric label for the session outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::PathRejected { .. } => "path_rejected",
            RelayError::HandshakeMalformed(_) => "handshake_malformed",
            RelayError::BackendUnreachable { .. } => "backend_unreachable",
            RelayError::MidStreamIo { .. } => "mid_stream_io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let rejected = RelayError::PathRejected {
            method: "GET".into(),
            path: "/nope".into(),
        };
        assert_eq!(rejected.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(rejected.to_string(), "GET /nope does not match the upgrade route");

        let malformed = RelayError::HandshakeMalformed("missing Sec-WebSocket-Key");
        assert_eq!(malformed.status(), Some(StatusCode::BAD_REQUEST));

        let mid = RelayError::MidStreamIo {
            source: std::io::ErrorKind::ConnectionReset.into(),
            client_to_backend: 10,
            backend_to_client: 20,
        };
        assert_eq!(mid.status(), None);
        assert_eq!(mid.outcome(), "mid_stream_io");
    }
}
