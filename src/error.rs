//! Error taxonomy for the connection multiplexer.
//!
//! Failure origins map to named error kinds so callers always observe a
//! typed error, never a bare panic. Kind names are namespaced by the
//! protocol-supplied prefix (see [`Error::qualified_name`]) so multiple
//! protocols sharing a process do not collide on kind names.
//!
//! # Propagation policy
//!
//! | Origin | Scope |
//! |--------|-------|
//! | Request/heartbeat encode failure | Rejects only that pending request |
//! | Oneway encode failure | Surfaced on the connection event channel |
//! | Response encode failure | Returned to the `write_response` caller |
//! | Decode failure, socket failure | Connection-fatal; tears everything down |
//! | Response timeout | Rejects only the timed-out request |
//!
//! Encode-family failures carry result code `"02"`, timeouts `"03"`.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Result Codes
// ============================================================================

/// Machine-readable result code for encode-family failures.
pub const RESULT_CODE_ENCODE: &str = "02";

/// Machine-readable result code for response timeouts.
pub const RESULT_CODE_TIMEOUT: &str = "03";

// ============================================================================
// ErrorKind
// ============================================================================

/// Named error kinds, one per failure origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport did not connect within the connect timeout.
    ConnectTimeout,
    /// Socket-level or decode failure; connection-fatal.
    SocketError,
    /// The socket closed with work still outstanding.
    SocketClose,
    /// The encoder rejected an outbound request or heartbeat.
    RequestEncode,
    /// The encoder rejected an outbound response or heartbeat ack.
    ResponseEncode,
    /// No response arrived within the caller-supplied timeout.
    ResponseTimeout,
    /// The encoder rejected a oneway request.
    OneWayEncode,
}

impl ErrorKind {
    /// Returns the unprefixed kind name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConnectTimeout => "ConnectTimeoutError",
            Self::SocketError => "SocketError",
            Self::SocketClose => "SocketCloseError",
            Self::RequestEncode => "RequestEncodeError",
            Self::ResponseEncode => "ResponseEncodeError",
            Self::ResponseTimeout => "ResponseTimeoutError",
            Self::OneWayEncode => "OneWayEncodeError",
        }
    }

    /// Returns the machine-readable result code, where one is defined.
    #[must_use]
    pub const fn result_code(self) -> Option<&'static str> {
        match self {
            Self::RequestEncode | Self::ResponseEncode | Self::OneWayEncode | Self::SocketClose => {
                Some(RESULT_CODE_ENCODE)
            }
            Self::ResponseTimeout => Some(RESULT_CODE_TIMEOUT),
            Self::ConnectTimeout | Self::SocketError => None,
        }
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// `Clone` because one teardown cause rejects every pending request on the
/// connection. Messages carry contextual detail: elapsed time for timeouts,
/// the connection `url` for socket-level failures.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The transport did not connect within the connect timeout.
    #[error("connect timeout({timeout_ms}ms), {url}")]
    ConnectTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
        /// Remote endpoint the connect was aimed at.
        url: String,
    },

    /// Socket-level or decode failure.
    ///
    /// Teardown appends the connection `url` to the message before the
    /// error is surfaced or used to drain pending requests.
    #[error("{message}")]
    Socket {
        /// Description of the underlying failure.
        message: String,
    },

    /// The socket closed while requests were still pending.
    #[error("The socket was closed, {url}")]
    SocketClosed {
        /// Remote endpoint of the closed connection.
        url: String,
    },

    /// The encoder rejected an outbound request or heartbeat.
    #[error("{message}")]
    RequestEncode {
        /// Error reported by the protocol encoder.
        message: String,
    },

    /// The encoder rejected an outbound response or heartbeat ack.
    #[error("{message}")]
    ResponseEncode {
        /// Error reported by the protocol encoder.
        message: String,
    },

    /// No response arrived within the caller-supplied timeout.
    #[error("no response in {elapsed_ms}ms, {url}")]
    ResponseTimeout {
        /// Measured wall-clock milliseconds since the request was issued.
        elapsed_ms: u64,
        /// Remote endpoint the request was sent to.
        url: String,
    },

    /// The encoder rejected a oneway request.
    #[error("{message}")]
    OneWayEncode {
        /// Error reported by the protocol encoder.
        message: String,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(timeout_ms: u64, url: impl Into<String>) -> Self {
        Self::ConnectTimeout {
            timeout_ms,
            url: url.into(),
        }
    }

    /// Creates a socket error.
    #[inline]
    pub fn socket(message: impl Into<String>) -> Self {
        Self::Socket {
            message: message.into(),
        }
    }

    /// Creates a socket-closed error.
    #[inline]
    pub fn socket_closed(url: impl Into<String>) -> Self {
        Self::SocketClosed { url: url.into() }
    }

    /// Creates a request encode error.
    #[inline]
    pub fn request_encode(message: impl Into<String>) -> Self {
        Self::RequestEncode {
            message: message.into(),
        }
    }

    /// Creates a response encode error.
    #[inline]
    pub fn response_encode(message: impl Into<String>) -> Self {
        Self::ResponseEncode {
            message: message.into(),
        }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(elapsed_ms: u64, url: impl Into<String>) -> Self {
        Self::ResponseTimeout {
            elapsed_ms,
            url: url.into(),
        }
    }

    /// Creates a oneway encode error.
    #[inline]
    pub fn oneway_encode(message: impl Into<String>) -> Self {
        Self::OneWayEncode {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Accessors
// ============================================================================

impl Error {
    /// Returns the named kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectTimeout { .. } => ErrorKind::ConnectTimeout,
            Self::Socket { .. } => ErrorKind::SocketError,
            Self::SocketClosed { .. } => ErrorKind::SocketClose,
            Self::RequestEncode { .. } => ErrorKind::RequestEncode,
            Self::ResponseEncode { .. } => ErrorKind::ResponseEncode,
            Self::ResponseTimeout { .. } => ErrorKind::ResponseTimeout,
            Self::OneWayEncode { .. } => ErrorKind::OneWayEncode,
        }
    }

    /// Returns the machine-readable result code, where one is defined.
    #[inline]
    #[must_use]
    pub const fn result_code(&self) -> Option<&'static str> {
        self.kind().result_code()
    }

    /// Returns the kind name qualified by a protocol prefix.
    ///
    /// E.g. `qualified_name("Rpc")` on a timeout yields
    /// `RpcResponseTimeoutError`.
    #[must_use]
    pub fn qualified_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.kind().name())
    }

    /// Appends the connection `url` to socket errors.
    ///
    /// Already-typed kinds keep their identity and message untouched.
    pub(crate) fn with_url(self, url: &str) -> Self {
        match self {
            Self::Socket { message } => Self::Socket {
                message: format!("{message}, {url}"),
            },
            other => other,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::ResponseTimeout { .. }
        )
    }

    /// Returns `true` if this is an encode failure.
    #[inline]
    #[must_use]
    pub const fn is_encode(&self) -> bool {
        matches!(
            self,
            Self::RequestEncode { .. } | Self::ResponseEncode { .. } | Self::OneWayEncode { .. }
        )
    }

    /// Returns `true` if this error tears down the whole connection.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Socket { .. } | Self::SocketClosed { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = Error::response_timeout(37, "127.0.0.1:12200");
        assert_eq!(err.to_string(), "no response in 37ms, 127.0.0.1:12200");
    }

    #[test]
    fn test_connect_timeout_display() {
        let err = Error::connect_timeout(1, "2.2.2.2:12200");
        assert_eq!(err.to_string(), "connect timeout(1ms), 2.2.2.2:12200");
    }

    #[test]
    fn test_socket_closed_display() {
        let err = Error::socket_closed("127.0.0.1:12200");
        assert_eq!(err.to_string(), "The socket was closed, 127.0.0.1:12200");
    }

    #[test]
    fn test_qualified_name() {
        let err = Error::response_timeout(5, "127.0.0.1:12200");
        assert_eq!(err.qualified_name("Rpc"), "RpcResponseTimeoutError");

        let err = Error::oneway_encode("mock error");
        assert_eq!(err.qualified_name("Rpc"), "RpcOneWayEncodeError");
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(Error::request_encode("x").result_code(), Some("02"));
        assert_eq!(Error::response_encode("x").result_code(), Some("02"));
        assert_eq!(Error::oneway_encode("x").result_code(), Some("02"));
        assert_eq!(Error::socket_closed("x").result_code(), Some("02"));
        assert_eq!(Error::response_timeout(1, "x").result_code(), Some("03"));
        assert_eq!(Error::socket("x").result_code(), None);
        assert_eq!(Error::connect_timeout(1, "x").result_code(), None);
    }

    #[test]
    fn test_with_url_appends_for_socket_errors_only() {
        let err = Error::socket("mock error").with_url("127.0.0.1:12200");
        assert_eq!(err.to_string(), "mock error, 127.0.0.1:12200");

        let err = Error::request_encode("mock error").with_url("127.0.0.1:12200");
        assert_eq!(err.to_string(), "mock error");
    }

    #[test]
    fn test_predicates() {
        assert!(Error::response_timeout(1, "x").is_timeout());
        assert!(Error::connect_timeout(1, "x").is_timeout());
        assert!(!Error::socket("x").is_timeout());

        assert!(Error::request_encode("x").is_encode());
        assert!(!Error::socket_closed("x").is_encode());

        assert!(Error::socket("x").is_fatal());
        assert!(Error::socket_closed("x").is_fatal());
        assert!(!Error::response_timeout(1, "x").is_fatal());
    }
}
