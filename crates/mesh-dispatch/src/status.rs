// ABOUTME: Embedded call status for Connect/Serve/Dispatch responses.
// ABOUTME: Business failures travel as data in CallStatus, never as gRPC errors.

use mesh_proto::CallStatus;
use std::fmt;
use thiserror::Error;

/// Outcome codes carried inside dispatch responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    NotFound,
    Internal,
}

impl StatusCode {
    /// Wire value (HTTP-flavoured).
    pub fn code(self) -> i32 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::InvalidArgument => 400,
            StatusCode::NotFound => 404,
            StatusCode::Internal => 500,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            200 => Some(StatusCode::Ok),
            400 => Some(StatusCode::InvalidArgument),
            404 => Some(StatusCode::NotFound),
            500 => Some(StatusCode::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// A failed call, reported to the caller inside a successful RPC response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct CallError {
    pub code: StatusCode,
    pub message: String,
}

impl CallError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::NotFound,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Internal,
            message: message.into(),
        }
    }
}

/// Output of a call, or why it failed.
pub type CallResult = Result<Vec<u8>, CallError>;

/// The OK status sent on success.
pub fn ok_status() -> CallStatus {
    CallStatus {
        code: StatusCode::Ok.code(),
        message: String::new(),
    }
}

impl From<&CallError> for CallStatus {
    fn from(err: &CallError) -> Self {
        CallStatus {
            code: err.code.code(),
            message: err.message.clone(),
        }
    }
}

impl From<CallError> for CallStatus {
    fn from(err: CallError) -> Self {
        CallStatus {
            code: err.code.code(),
            message: err.message,
        }
    }
}

/// Interpret an embedded status received from a peer.
///
/// A missing status or a code outside the known set is treated as INTERNAL.
pub fn check_status(status: Option<&CallStatus>) -> Result<(), CallError> {
    let Some(status) = status else {
        return Err(CallError::internal("response carried no status"));
    };
    match StatusCode::from_code(status.code) {
        Some(StatusCode::Ok) => Ok(()),
        Some(code) => Err(CallError {
            code,
            message: status.message.clone(),
        }),
        None => Err(CallError::internal(format!(
            "unknown status code {}: {}",
            status.code, status.message
        ))),
    }
}

/// Embed a call result into the wire status plus output pair.
pub fn into_wire(result: CallResult) -> (CallStatus, Vec<u8>) {
    match result {
        Ok(output) => (ok_status(), output),
        Err(err) => (err.into(), Vec::new()),
    }
}
