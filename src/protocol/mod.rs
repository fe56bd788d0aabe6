//! Protocol plugin traits.
//!
//! The wire codec is supplied by the application: a [`Protocol`] names the
//! wire format and builds one encoder/decoder pair per connection. The
//! connection owns both exclusively and never exposes them for external
//! mutation.
//!
//! # Contract
//!
//! - The encoder writes the four wire verbs (request, response, heartbeat,
//!   heartbeat ack) into a byte buffer the connection flushes to the
//!   transport. Failures are reported as `io::Error`, never panics; the
//!   connection maps them into its error taxonomy.
//! - The decoder is incremental: it consumes complete frames from the front
//!   of the read buffer and returns `Ok(None)` until more bytes arrive.
//!   A malformed frame is a hard error and tears the connection down.
//! - Codec configuration travels inside the application-constructed
//!   protocol value; the factory methods take `&self`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Request/response payload types and decoded frame events |

// ============================================================================
// Submodules
// ============================================================================

/// Payload types and decoded frame events.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{FrameEvent, InboundHeartbeat, InboundRequest, Request, Response};

// ============================================================================
// Imports
// ============================================================================

use std::io;

use bytes::BytesMut;

use crate::id::CorrelationId;

// ============================================================================
// Protocol
// ============================================================================

/// A pluggable wire protocol.
///
/// One encoder and one decoder are built per connection. The protocol
/// [`name`](Protocol::name) doubles as the prefix for qualified error kind
/// names (`Rpc` yields `RpcResponseTimeoutError`).
pub trait Protocol: Send + 'static {
    /// Encoder type produced by [`encoder`](Protocol::encoder).
    type Encoder: ProtocolEncoder + Send + 'static;

    /// Decoder type produced by [`decoder`](Protocol::decoder).
    type Decoder: ProtocolDecoder + Send + 'static;

    /// Protocol name, used as the error-kind prefix.
    fn name(&self) -> &str;

    /// Builds the outbound frame encoder for one connection.
    fn encoder(&self) -> Self::Encoder;

    /// Builds the inbound frame decoder for one connection.
    fn decoder(&self) -> Self::Decoder;
}

// ============================================================================
// ProtocolEncoder
// ============================================================================

/// Serializes outbound frames into a byte buffer.
///
/// Each verb appends exactly one frame to `dst`. An `Err` means the frame
/// could not be produced; nothing may have been appended in that case, and
/// the connection settles or surfaces the failure without touching other
/// in-flight work.
pub trait ProtocolEncoder {
    /// Encodes an outbound request under the given correlation id.
    fn encode_request(
        &mut self,
        id: CorrelationId,
        request: &Request,
        dst: &mut BytesMut,
    ) -> io::Result<()>;

    /// Encodes a response to an inbound request, echoing its id.
    fn encode_response(
        &mut self,
        request: &InboundRequest,
        response: &Response,
        dst: &mut BytesMut,
    ) -> io::Result<()>;

    /// Encodes an outbound heartbeat under the given correlation id.
    fn encode_heartbeat(
        &mut self,
        id: CorrelationId,
        heartbeat: &Request,
        dst: &mut BytesMut,
    ) -> io::Result<()>;

    /// Encodes an ack for an inbound heartbeat, echoing its id.
    fn encode_heartbeat_ack(
        &mut self,
        heartbeat: &InboundHeartbeat,
        dst: &mut BytesMut,
    ) -> io::Result<()>;
}

// ============================================================================
// ProtocolDecoder
// ============================================================================

/// Parses inbound bytes into typed frame events.
pub trait ProtocolDecoder {
    /// Decodes one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` when `src` does not yet hold a complete frame;
    /// decoded frames must be split off `src`. `Err` means malformed input
    /// and is connection-fatal.
    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<FrameEvent>>;
}
