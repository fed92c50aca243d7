//! Error types for Kino Cast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type alias for cast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Cast error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Capability errors
    #[error("Cast capability unavailable after {attempts} attempts")]
    CapabilityUnavailable { attempts: u32 },

    // Lifecycle errors
    #[error("Cast initialization failed: {0}")]
    InitializationFailed(TransportError),

    #[error("Session launch failed: {0}")]
    SessionLaunchFailed(TransportError),

    #[error("Session stop failed: {0}")]
    SessionStopFailed(TransportError),

    #[error("Cast request cancelled by user")]
    UserCancelled,

    // Input errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid cast state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Runtime errors
    #[error("Cast service is no longer running")]
    ServiceStopped,
}

impl Error {
    /// Returns true if the controller stays operable after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::CapabilityUnavailable { .. } | Error::UserCancelled => true,
            _ => self
                .transport_error()
                .is_some_and(|e| e.class() != ErrorClass::Fatal),
        }
    }

    /// Returns the error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::CapabilityUnavailable { .. } => "CAPABILITY_UNAVAILABLE",
            Error::InitializationFailed(_) => "INIT_FAILED",
            Error::SessionLaunchFailed(_) => "LAUNCH_FAILED",
            Error::SessionStopFailed(_) => "STOP_FAILED",
            Error::UserCancelled => "CANCELLED",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::ServiceStopped => "SERVICE_STOPPED",
        }
    }

    /// The transport error underneath a lifecycle failure, if any
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Error::InitializationFailed(e)
            | Error::SessionLaunchFailed(e)
            | Error::SessionStopFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// How a transport error is handled at the controller boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Environment or receiver trouble: flag the indicator, stay operable
    Transient,
    /// The user dismissed the receiver picker: say nothing
    Cancelled,
    /// Unexpected: forward to the host player's fatal error channel
    Fatal,
}

/// Error codes reported by the cast transport SDK
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CastErrorCode {
    ApiNotInitialized,
    Cancel,
    ChannelError,
    ExtensionMissing,
    ExtensionNotCompatible,
    InvalidParameter,
    LoadMediaFailed,
    ReceiverUnavailable,
    SessionError,
    Timeout,
    /// Any code this crate does not know about
    Other(String),
}

impl CastErrorCode {
    /// Wire representation used by the SDK
    pub fn as_str(&self) -> &str {
        match self {
            CastErrorCode::ApiNotInitialized => "api_not_initialized",
            CastErrorCode::Cancel => "cancel",
            CastErrorCode::ChannelError => "channel_error",
            CastErrorCode::ExtensionMissing => "extension_missing",
            CastErrorCode::ExtensionNotCompatible => "extension_not_compatible",
            CastErrorCode::InvalidParameter => "invalid_parameter",
            CastErrorCode::LoadMediaFailed => "load_media_failed",
            CastErrorCode::ReceiverUnavailable => "receiver_unavailable",
            CastErrorCode::SessionError => "session_error",
            CastErrorCode::Timeout => "timeout",
            CastErrorCode::Other(code) => code,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CastErrorCode::ApiNotInitialized
            | CastErrorCode::ChannelError
            | CastErrorCode::ExtensionMissing
            | CastErrorCode::ExtensionNotCompatible
            | CastErrorCode::InvalidParameter
            | CastErrorCode::LoadMediaFailed
            | CastErrorCode::ReceiverUnavailable
            | CastErrorCode::SessionError
            | CastErrorCode::Timeout => ErrorClass::Transient,
            CastErrorCode::Cancel => ErrorClass::Cancelled,
            CastErrorCode::Other(_) => ErrorClass::Fatal,
        }
    }

    /// All codes the transient class covers
    pub const TRANSIENT: [CastErrorCode; 9] = [
        CastErrorCode::ApiNotInitialized,
        CastErrorCode::ChannelError,
        CastErrorCode::ExtensionMissing,
        CastErrorCode::ExtensionNotCompatible,
        CastErrorCode::InvalidParameter,
        CastErrorCode::LoadMediaFailed,
        CastErrorCode::ReceiverUnavailable,
        CastErrorCode::SessionError,
        CastErrorCode::Timeout,
    ];
}

impl CastErrorCode {
    /// Parse an SDK code, falling back to `Other` for unknown values
    pub fn from_code(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "api_not_initialized" => CastErrorCode::ApiNotInitialized,
            "cancel" => CastErrorCode::Cancel,
            "channel_error" => CastErrorCode::ChannelError,
            "extension_missing" => CastErrorCode::ExtensionMissing,
            "extension_not_compatible" => CastErrorCode::ExtensionNotCompatible,
            "invalid_parameter" => CastErrorCode::InvalidParameter,
            "load_media_failed" => CastErrorCode::LoadMediaFailed,
            "receiver_unavailable" => CastErrorCode::ReceiverUnavailable,
            "session_error" => CastErrorCode::SessionError,
            "timeout" => CastErrorCode::Timeout,
            _ => CastErrorCode::Other(s.to_string()),
        }
    }
}

impl FromStr for CastErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(CastErrorCode::from_code(s))
    }
}

impl fmt::Display for CastErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CastErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CastErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CastErrorCode::from_code(&raw))
    }
}

/// A failure reported by the transport through one of its callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub code: CastErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TransportError {
    pub fn new(code: CastErrorCode) -> Self {
        Self { code, description: None }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }
}

impl From<CastErrorCode> for TransportError {
    fn from(code: CastErrorCode) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({})", self.code, description),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for TransportError {}
