//! Error types for the LIFX control library.
//!
//! Malformed datagrams surface as [`CodecError`], which readers log and drop.
//! Everything a caller can act on is a variant of [`LifxError`].

use std::net::SocketAddr;

use thiserror::Error;

use crate::device::Serial;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, LifxError>;

/// Failures while encoding or decoding wire messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer is shorter than the 36-byte header.
    #[error("packet too short: {0} bytes")]
    TooShort(usize),

    /// Header carries a protocol number other than 1024.
    #[error("unexpected protocol number {0}")]
    WrongProtocol(u16),

    /// Header size field disagrees with the datagram length.
    #[error("header size {declared} does not fit a {actual}-byte datagram")]
    BadSize { declared: usize, actual: usize },

    /// Payload is shorter than its fixed layout.
    #[error("{kind} payload needs {expected} bytes, got {actual}")]
    Truncated {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} has invalid {field} value {value}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        value: u64,
    },

    /// Encoded packet would not fit the 16-bit size field.
    #[error("payload of {0} bytes exceeds the size field")]
    PayloadTooLarge(usize),

    /// More colors than the message can carry.
    #[error("{kind} carries at most {max} colors, got {actual}")]
    TooManyColors {
        kind: &'static str,
        max: usize,
        actual: usize,
    },
}

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum LifxError {
    #[error("malformed packet: {0}")]
    Codec(#[from] CodecError),

    /// No reply within the configured window.
    #[error("no response from {target} to {request}")]
    Timeout {
        target: String,
        request: &'static str,
    },

    #[error("'{token}' matches more than one device: {}", candidates.join(", "))]
    AmbiguousIdentifier {
        token: String,
        candidates: Vec<String>,
    },

    #[error("no device matches '{0}'")]
    UnknownIdentifier(String),

    #[error("device {serial} does not support {capability}")]
    UnsupportedCapability {
        serial: Serial,
        capability: &'static str,
    },

    #[error("expected {expected} pixels, got {actual}")]
    InvalidPixelCount { expected: usize, actual: usize },

    #[error("unknown effect '{0}'")]
    UnknownEffect(String),

    #[error("invalid color '{0}'")]
    InvalidColor(String),

    #[error("invalid serial '{0}'")]
    InvalidSerial(String),

    #[error("invalid subnet '{0}'")]
    InvalidSubnet(String),

    #[error("send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LifxError {
    pub(crate) fn timeout(target: impl ToString, request: &'static str) -> Self {
        LifxError::Timeout {
            target: target.to_string(),
            request,
        }
    }

    /// True for the "no response" outcome, which is expected for offline devices.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LifxError::Timeout { .. })
    }
}
