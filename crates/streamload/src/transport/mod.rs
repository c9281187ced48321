//! Transport boundary consumed by sessions.
//!
//! A session only needs four things from the RPC layer: dial a connection,
//! optionally make a unary call, open a bidirectional stream, and then send,
//! receive and half-close on that stream. These are modeled as three traits so
//! the session and coordinator logic can be driven by the real `tonic`
//! transport ([`GrpcTransport`]) or by scripted fakes in tests.
//!
//! ## Structure
//!
//! - [`grpc`] - `tonic` implementation over `Channel`.
//! - [`tls`] - TLS connector that skips certificate verification.

pub mod grpc;
pub mod tls;

pub use grpc::{GrpcConnection, GrpcStream, GrpcTransport};

use core::future::Future;
use streamload_core::{
    Result,
    proto::{HelloReply, HelloRequest},
};

/// Factory for connections to the configured target.
///
/// A transport is shared by every session of a run; each call to
/// [`dial`](Transport::dial) yields a connection owned by exactly one session.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    /// Establishes a new connection to the target.
    ///
    /// # Errors
    ///
    /// Returns a connection-class error if the endpoint is unreachable, the
    /// TLS handshake fails, or the connect timeout expires.
    fn dial(&self) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// An established connection to the Greeter service.
pub trait Connection: Send + 'static {
    type Stream: MessageStream;

    /// Performs one unary `SayHello` call and returns the greeting.
    fn say_hello(&mut self, name: &str) -> impl Future<Output = Result<String>> + Send;

    /// Opens a `SayHelloStream` bidirectional stream.
    fn open_stream(&mut self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// One bidirectional `SayHelloStream` exchange.
pub trait MessageStream: Send + 'static {
    /// Writes one request message.
    fn send(&mut self, request: HelloRequest) -> impl Future<Output = Result<()>> + Send;

    /// Reads the next reply. `Ok(None)` means the server ended the stream
    /// cleanly.
    fn recv(&mut self) -> impl Future<Output = Result<Option<HelloReply>>> + Send;

    /// Closes the request half. The response half stays readable.
    fn close_send(&mut self) -> impl Future<Output = Result<()>> + Send;
}
