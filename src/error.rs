//! Error types and result definitions for the hs1xx crate.
//! Merges failures reported by the device with failures of the exchange itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a plug.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShpError {
    /// Standard IO error on an established connection
    #[error("IO error: {0}")]
    Io(String),

    /// TCP connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The socket accepted fewer bytes than the frame holds
    #[error("Short write: {written} of {expected} bytes sent")]
    ShortWrite { written: usize, expected: usize },

    /// The connection closed before the declared frame length was received
    #[error("Incomplete read: expected {expected} bytes, received {received}")]
    IncompleteRead { expected: usize, received: usize },

    /// The length prefix announced an implausibly large frame
    #[error("Frame too large: {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The call deadline expired
    #[error("Timeout waiting for device")]
    Timeout,

    /// The caller cancelled the call
    #[error("Call cancelled")]
    Cancelled,

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// The reply did not have the namespace/command shape of the request
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The reply has no entry for a command that expected one
    #[error("No reply for {namespace}.{command}")]
    MissingReply { namespace: String, command: String },

    /// Nonzero error code reported by the device for one command
    #[error("Device error {code}: {message}")]
    Device { code: i64, message: String },

    /// The dispatch task ended without publishing a result
    #[error("Dispatch task dropped before completion")]
    TaskDropped,
}

/// A specialized Result type for plug operations.
pub type Result<T> = std::result::Result<T, ShpError>;

impl From<std::io::Error> for ShpError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ShpError::Timeout,
            _ => ShpError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ShpError {
    fn from(err: serde_json::Error) -> Self {
        ShpError::Json(err.to_string())
    }
}

impl ShpError {
    /// Builds a device error from a reported code, falling back to the
    /// built-in message table when the device sent no message.
    pub fn device(code: i64, message: Option<&str>) -> Self {
        ShpError::Device {
            code,
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| get_error_message(code).to_string()),
        }
    }

    /// Dial, write, read, cancellation and deadline failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ShpError::Io(_)
                | ShpError::ConnectionFailed(_)
                | ShpError::ShortWrite { .. }
                | ShpError::IncompleteRead { .. }
                | ShpError::FrameTooLarge { .. }
                | ShpError::Timeout
                | ShpError::Cancelled
                | ShpError::TaskDropped
        )
    }

    /// Malformed or unexpectedly shaped payloads.
    pub fn is_decoding(&self) -> bool {
        matches!(
            self,
            ShpError::Json(_) | ShpError::InvalidPayload(_) | ShpError::MissingReply { .. }
        )
    }

    /// The device error code, if this error was reported by the device.
    pub fn device_code(&self) -> Option<i64> {
        match self {
            ShpError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// Smart Home Protocol error codes
define_error_codes! {
    ERR_SUCCESS = 0 => "Success",
    ERR_MODULE_NOT_SUPPORT = -1 => "Module not supported",
    ERR_METHOD_NOT_SUPPORT = -2 => "Method not supported",
}

/// The error capability embedded in every response type.
///
/// `err_code` and `err_msg` are decoded from the device reply, while
/// `transport_error` records a failure that aborted the exchange itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcStatus {
    #[serde(default)]
    pub err_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(skip)]
    pub transport_error: Option<ShpError>,
}

impl RpcStatus {
    /// Resolves the status: a nonzero device code wins over a transport error.
    pub fn check(&self) -> Result<()> {
        if self.err_code != ERR_SUCCESS {
            return Err(ShpError::device(self.err_code, self.err_msg.as_deref()));
        }
        match &self.transport_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.check().is_ok()
    }
}

/// Implemented by every value a dispatched call publishes.
pub trait RpcResult {
    fn status(&self) -> &RpcStatus;

    fn status_mut(&mut self) -> &mut RpcStatus;

    /// The unified error check.
    fn err(&self) -> Result<()> {
        self.status().check()
    }
}

impl RpcResult for RpcStatus {
    fn status(&self) -> &RpcStatus {
        self
    }

    fn status_mut(&mut self) -> &mut RpcStatus {
        self
    }
}
