// ABOUTME: Error types for the mesh-dispatch crate.
// ABOUTME: Infrastructure failures of peer links; business failures use CallError instead.

use thiserror::Error;

/// Errors establishing or using a peer link.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Invalid peer address format.
    #[error("invalid peer address: {0}")]
    InvalidAddress(String),

    /// The transport dial failed.
    #[error("connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// The peer answered with a non-OK embedded status.
    #[error("peer rejected connection ({code}): {message}")]
    Remote { code: i32, message: String },

    /// The peer call failed at the transport level.
    #[error("rpc error: {0}")]
    Rpc(#[from] tonic::Status),
}

impl From<tonic::transport::Error> for DispatchError {
    fn from(err: tonic::transport::Error) -> Self {
        DispatchError::ConnectionFailed {
            address: String::new(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DispatchError::InvalidAddress("not a url".to_string());
        assert_eq!(err.to_string(), "invalid peer address: not a url");

        let err = DispatchError::Remote {
            code: 400,
            message: "address is required".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "peer rejected connection (400): address is required"
        );

        let err = DispatchError::ConnectionFailed {
            address: "http://127.0.0.1:1".to_string(),
            reason: "refused".to_string(),
        };
        assert!(err.to_string().contains("http://127.0.0.1:1"));
    }

    #[test]
    fn test_from_tonic_status() {
        let status = tonic::Status::unavailable("peer gone");
        let err: DispatchError = status.into();
        assert!(matches!(err, DispatchError::Rpc(s) if s.code() == tonic::Code::Unavailable));
    }
}
