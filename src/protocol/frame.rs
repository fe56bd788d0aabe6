//! Payload types and decoded frame events.
//!
//! Payloads are protocol-defined and opaque to the multiplexer beyond the
//! correlation id: they are carried as [`serde_json::Value`] and handed to
//! the codec untouched.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;

use crate::id::CorrelationId;

// ============================================================================
// Request
// ============================================================================

/// An outbound request or heartbeat payload.
///
/// `timeout` is required and caller-supplied; there is no implicit default.
/// A zero timeout fires immediately, consistent with normal timer semantics.
#[derive(Debug, Clone)]
pub struct Request {
    /// Opaque payload handed to the protocol encoder.
    pub payload: Value,

    /// How long to wait for the matching response.
    pub timeout: Duration,

    /// Set by [`Connection::oneway`](crate::Connection::oneway); no
    /// response is expected or tracked.
    pub oneway: bool,
}

impl Request {
    /// Creates a request with the given payload and response timeout.
    #[inline]
    #[must_use]
    pub fn new(payload: Value, timeout: Duration) -> Self {
        Self {
            payload,
            timeout,
            oneway: false,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response or heartbeat-ack payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Opaque payload handed to the protocol encoder.
    pub payload: Value,
}

impl Response {
    /// Creates a response carrying the given payload.
    #[inline]
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

// ============================================================================
// InboundRequest
// ============================================================================

/// A request decoded from the peer.
///
/// Carries the peer's correlation id so
/// [`Connection::write_response`](crate::Connection::write_response) can
/// echo it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// The peer's correlation id for this exchange.
    pub id: CorrelationId,

    /// Opaque decoded payload.
    pub payload: Value,

    /// The peer does not expect a response.
    pub oneway: bool,
}

// ============================================================================
// InboundHeartbeat
// ============================================================================

/// A heartbeat decoded from the peer, awaiting an ack.
#[derive(Debug, Clone)]
pub struct InboundHeartbeat {
    /// The peer's correlation id for this exchange.
    pub id: CorrelationId,

    /// Opaque decoded payload.
    pub payload: Value,
}

// ============================================================================
// FrameEvent
// ============================================================================

/// A typed event produced by a protocol decoder.
///
/// `Request` and `Heartbeat` are forwarded upward as new inbound work;
/// `Response` and `HeartbeatAck` are routed to the pending-request table by
/// correlation id.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A new request from the peer.
    Request(InboundRequest),

    /// A response settling one of our pending requests.
    Response {
        /// Correlation id echoed by the peer.
        id: CorrelationId,
        /// The decoded response.
        response: Response,
    },

    /// A keep-alive probe from the peer.
    Heartbeat(InboundHeartbeat),

    /// An ack settling one of our pending heartbeats.
    HeartbeatAck {
        /// Correlation id echoed by the peer.
        id: CorrelationId,
        /// The decoded ack payload.
        response: Response,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_defaults_to_two_way() {
        let req = Request::new(json!({"method": "sayHello"}), Duration::from_millis(50));
        assert!(!req.oneway);
        assert_eq!(req.timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_response_payload_equality() {
        let a = Response::new(json!({"appResponse": "hello"}));
        let b = Response::new(json!({"appResponse": "hello"}));
        assert_eq!(a, b);
    }
}
