//! Connection-level request/response multiplexer.
//!
//! One physical byte-stream transport carries many logical, concurrently
//! in-flight request/response exchanges, each identified by a correlation
//! id. The [`Connection`] matches inbound responses back to the caller that
//! issued the matching request, enforces per-request timeouts, and defines
//! the shutdown semantics (graceful drain vs. immediate abort) for a
//! connection with outstanding work.
//!
//! # Architecture
//!
//! The wire codec is pluggable: the application supplies a [`Protocol`]
//! that builds one encoder/decoder pair per connection. The connection owns
//! the transport and codec exclusively inside an event-loop task; callers
//! interact through a cheap-to-clone handle.
//!
//! Key design points:
//!
//! - Every pending request settles exactly once: response, timeout, encode
//!   failure, or teardown drain
//! - Encode failures are local to one request; decode and socket failures
//!   tear down the whole connection
//! - Correlation ids come from one process-wide counter bounded by the wire
//!   integer width (`[1, 2^30)`, wrapping)
//! - Retries, load balancing, and pooling belong to the layer above
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use serde_json::json;
//! use sockmux::{Connection, ConnectionOptions, Request, Response};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> sockmux::Result<()> {
//!     // MyProtocol implements sockmux::Protocol
//!     let conn = Connection::connect(
//!         TcpStream::connect("127.0.0.1:12200"),
//!         MyProtocol::new(),
//!         ConnectionOptions::new().url("127.0.0.1:12200"),
//!     )
//!     .await?;
//!
//!     // concurrent callers share the handle; responses match by id
//!     let response = conn
//!         .write_request(Request::new(json!({"method": "sayHello"}), Duration::from_secs(3)))
//!         .await?;
//!     println!("{}", response.payload);
//!
//!     // serve the peer's requests from the event stream
//!     let mut events = conn.take_events().expect("events");
//!     while let Some(event) = events.recv().await {
//!         if let sockmux::ConnectionEvent::Request(req) = event {
//!             conn.write_response(&req, Response::new(json!("ok"))).await?;
//!         }
//!     }
//!
//!     conn.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | The [`Connection`] handle and its event loop |
//! | [`error`] | Error taxonomy and [`Result`] alias |
//! | [`id`] | Correlation ids and the shared allocator |
//! | [`protocol`] | Protocol plugin traits and frame types |
//! | [`transport`] | Byte-stream transport bound |

// ============================================================================
// Modules
// ============================================================================

/// The connection handle, its lifecycle, and the event loop.
pub mod connection;

/// Error taxonomy and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Correlation ids and the process-wide allocator.
pub mod id;

/// Pending-request table.
///
/// Internal: mutated only by the connection's write, route, and teardown
/// paths.
mod pending;

/// Protocol plugin traits and frame types.
pub mod protocol;

/// Byte-stream transport bound.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{Connection, ConnectionEvent, ConnectionEvents, ConnectionOptions, State};

// Error types
pub use error::{Error, ErrorKind, RESULT_CODE_ENCODE, RESULT_CODE_TIMEOUT, Result};

// Identifier types
pub use id::{CorrelationId, IdAllocator, MAX_CORRELATION_ID};

// Protocol types
pub use protocol::{
    FrameEvent, InboundHeartbeat, InboundRequest, Protocol, ProtocolDecoder, ProtocolEncoder,
    Request, Response,
};

// Transport bound
pub use transport::Transport;
