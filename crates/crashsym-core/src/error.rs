//! # Error Types
//!
//! Error handling for the symbolication pipeline.
//!
//! Two layers of failure exist here. [`SymbolicationError`] is a real
//! `Result` error: something went wrong that aborts an operation (a broken
//! report, a service that violated the protocol). [`SymbolicationFailed`]
//! is a frame-level outcome: one frame could not be symbolized, the pipeline
//! keeps going, and the failure ends up as an [`EventError`] annotation on
//! the processed event.

use crashsym_protocol::RawImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::types::DebugImage;

/// Main error type for pipeline operations
///
/// ## Error Categories
///
/// 1. **Input errors**: InvalidReport, Json
/// 2. **Remote errors**: Service, ProtocolViolation
/// 3. **Local errors**: DebugFile, Io
/// 4. **Setup errors**: Config
#[derive(Error, Debug)]
pub enum SymbolicationError
{
    /// The crash report is not shaped like a native event
    ///
    /// Raised when the report cannot be read at all (not an object, or a
    /// required field such as `event_id` is missing).
    #[error("Invalid crash report: {0}")]
    InvalidReport(String),

    /// The symbolication service answered with a payload that does not match the request
    ///
    /// A completed response must have exactly one module record per submitted
    /// image and one stacktrace per submitted batch. Anything else aborts the
    /// remote step for the whole event.
    #[error("Symbolication service violated the protocol: {0}")]
    ProtocolViolation(String),

    /// A remote service could not be reached or answered with an error.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A local debug file exists but could not be parsed
    #[error("Failed to load debug file {path}: {details}")]
    DebugFile
    {
        /// Path of the debug file
        path: String,
        /// Parser error
        details: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error (reading events, debug files, minidumps)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, SymbolicationError>;

/// Transport-level failure of a remote service call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError
{
    /// The service answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Status
    {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// The request never produced a response (DNS, connect, read timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError
{
    /// `true` if the service does not know the polled request id.
    pub fn is_not_found(&self) -> bool
    {
        matches!(self, ServiceError::Status { status: 404, .. })
    }

    /// `true` for failures worth another attempt (unavailable, connection trouble).
    pub fn is_retryable(&self) -> bool
    {
        matches!(self, ServiceError::Status { status: 502..=504, .. } | ServiceError::Transport(_))
    }
}

/// Why a single frame (or image) could not be symbolized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason
{
    /// No debug file was found for the image.
    MissingDebugFile,
    /// A debug file was found but could not be processed.
    MalformedDebugFile,
    /// The debug file has no symbol for the address.
    MissingSymbol,
    /// The address is not covered by any image.
    UnknownImage,
    /// The debug file exceeded the download size limit.
    FetchTooLarge,
    /// Downloading the debug file failed.
    FetchFailed,
    /// Anything else, including service-side timeouts.
    Internal,
}

impl FailureReason
{
    /// Annotation kind reported on the event for this reason.
    pub const fn event_error_kind(self) -> EventErrorKind
    {
        match self {
            FailureReason::MissingDebugFile => EventErrorKind::NativeMissingDsym,
            FailureReason::MalformedDebugFile => EventErrorKind::NativeBadDsym,
            FailureReason::MissingSymbol => EventErrorKind::NativeMissingSymbol,
            FailureReason::UnknownImage => EventErrorKind::NativeUnknownImage,
            FailureReason::FetchTooLarge => EventErrorKind::FetchTooLarge,
            FailureReason::FetchFailed => EventErrorKind::FetchGenericError,
            FailureReason::Internal => EventErrorKind::NativeInternalFailure,
        }
    }

    const fn describe(self) -> &'static str
    {
        match self {
            FailureReason::MissingDebugFile => "missing debug file",
            FailureReason::MalformedDebugFile => "malformed debug file",
            FailureReason::MissingSymbol => "missing symbol",
            FailureReason::UnknownImage => "unknown image",
            FailureReason::FetchTooLarge => "debug file too large",
            FailureReason::FetchFailed => "failed to fetch debug file",
            FailureReason::Internal => "internal failure",
        }
    }
}

impl std::fmt::Display for FailureReason
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.write_str(self.describe())
    }
}

/// A frame-level symbolication failure
///
/// Carries enough about the image to let a user find out which debug file
/// to upload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}{}", .image_path.as_deref().map(|p| format!(" ({p})")).unwrap_or_default())]
pub struct SymbolicationFailed
{
    pub reason: FailureReason,
    pub message: Option<String>,
    pub image_path: Option<String>,
    pub image_uuid: Option<String>,
    pub image_arch: Option<String>,
}

impl SymbolicationFailed
{
    pub fn new(reason: FailureReason) -> Self
    {
        Self {
            reason,
            message: None,
            image_path: None,
            image_uuid: None,
            image_arch: None,
        }
    }

    /// Attach the identity of the image the failure belongs to.
    #[must_use]
    pub fn with_image(mut self, image: &DebugImage) -> Self
    {
        self.image_path = image.code_file().map(str::to_string);
        self.image_uuid = Some(image.debug_id().to_string());
        self.image_arch = image.arch_name().map(str::to_string);
        self
    }

    /// Attach image identity from an unvalidated image record.
    #[must_use]
    pub fn with_raw_image(mut self, image: &RawImage) -> Self
    {
        self.image_path = image.code_file_or_name().map(str::to_string);
        self.image_uuid = image.any_identifier().map(str::to_string);
        self.image_arch = image.arch.clone();
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self
    {
        self.message = Some(message.into());
        self
    }

    /// Event annotation for this failure.
    pub fn to_event_error(&self) -> EventError
    {
        EventError {
            kind: self.reason.event_error_kind(),
            name: self.image_path.as_deref().map(image_name),
            image_path: self.image_path.clone(),
            image_uuid: self.image_uuid.clone(),
            image_arch: self.image_arch.clone(),
            message: self.message.clone(),
        }
    }
}

/// File name part of a code file path, for either path convention.
fn image_name(path: &str) -> String
{
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Kind tag of an [`EventError`] as downstream consumers read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventErrorKind
{
    NativeMissingDsym,
    NativeBadDsym,
    NativeMissingSymbol,
    NativeUnknownImage,
    NativeInternalFailure,
    NativeSymbolicatorFailed,
    FetchTooLarge,
    FetchGenericError,
}

/// Processing error recorded on the event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventError
{
    #[serde(rename = "type")]
    pub kind: EventErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EventError
{
    pub fn new(kind: EventErrorKind) -> Self
    {
        Self {
            kind,
            name: None,
            image_path: None,
            image_uuid: None,
            image_arch: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self
    {
        self.message = Some(message.into());
        self
    }
}
