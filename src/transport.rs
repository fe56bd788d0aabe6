//! Byte-stream transport bound.
//!
//! A connection multiplexes over any bidirectional byte stream. Connection
//! establishment beyond the connect-timeout race is the application's
//! business; the multiplexer only needs read/write halves and, when the
//! transport knows it, a remote endpoint to put in error messages.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

// ============================================================================
// Transport
// ============================================================================

/// A bidirectional byte-stream endpoint a connection can own.
///
/// Implemented for [`TcpStream`], Unix sockets, and tokio's in-memory
/// [`DuplexStream`](tokio::io::DuplexStream) (handy in tests).
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Remote endpoint formatted as `host:port`, when the transport
    /// knows it.
    ///
    /// Used to resolve the connection `url` when the application does not
    /// supply one.
    fn peer_url(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// Implementations
// ============================================================================

impl Transport for TcpStream {
    fn peer_url(&self) -> Option<String> {
        self.peer_addr().ok().map(|addr| addr.to_string())
    }
}

#[cfg(unix)]
impl Transport for tokio::net::UnixStream {}

impl Transport for tokio::io::DuplexStream {}

// ============================================================================
// Tests
// ============================================================================
