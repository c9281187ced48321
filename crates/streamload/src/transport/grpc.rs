//! `tonic` implementation of the transport boundary.
//!
//! [`GrpcTransport`] resolves the endpoint once per run; each
//! [`dial`](Transport::dial) creates an independent `Channel` (one HTTP/2
//! connection per simulated client). A [`GrpcStream`] feeds requests through a
//! bounded channel into the streaming call, so the initial message can be
//! queued before the server has answered with response headers.

use super::{Connection, MessageStream, Transport, tls};
use crate::config::{Compression, SessionConfig};
use core::{future::Future, pin::Pin, time::Duration};
use streamload_core::{
    Error, Result,
    proto::{HelloReply, HelloRequest, greeter_client::GreeterClient},
};
use tokio::{sync::mpsc, time::timeout};
use tokio_rustls::TlsConnector;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{
    Response, Status, Streaming,
    transport::{Channel, ClientTlsConfig, Endpoint, Uri},
};
use tower::service_fn;

/// Requests buffered between a session and the HTTP/2 body.
const OUTBOUND_BUFFER: usize = 4;

type PendingCall =
    Pin<Box<dyn Future<Output = core::result::Result<Response<Streaming<HelloReply>>, Status>> + Send>>;

#[derive(Clone)]
enum Security {
    Plaintext,
    /// TLS through `tonic` with the platform's native roots.
    Verified,
    /// TLS through our own connector, skipping certificate verification.
    Insecure(TlsConnector),
}

/// Dials the configured Greeter endpoint over plaintext or TLS.
#[derive(Clone)]
pub struct GrpcTransport {
    addr: String,
    endpoint: Endpoint,
    security: Security,
    connect_timeout: Duration,
    compression: Compression,
}

impl GrpcTransport {
    /// Resolves the endpoint and TLS mode for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] when the server address cannot form
    /// a URI, or [`Error::Tls`] when the TLS configuration cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let security = match (config.tls, config.insecure_skip_verify) {
            (false, _) => Security::Plaintext,
            (true, false) => Security::Verified,
            (true, true) => Security::Insecure(tls::insecure_connector()?),
        };

        // With the insecure connector TLS happens below `tonic`, so the
        // channel itself must see a plain `http` URI.
        let scheme = match security {
            Security::Verified => "https",
            Security::Plaintext | Security::Insecure(_) => "http",
        };
        let uri = endpoint_uri(&config.server, scheme)?;

        let mut endpoint = Endpoint::from(uri)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true);
        if matches!(security, Security::Verified) {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| Error::Tls {
                    reason: e.to_string(),
                })?;
        }

        Ok(Self {
            addr: config.server.clone(),
            endpoint,
            security,
            connect_timeout: config.connect_timeout,
            compression: config.compression,
        })
    }

    async fn connect_channel(&self) -> Result<Channel> {
        let channel = match &self.security {
            Security::Insecure(connector) => {
                let connector = connector.clone();
                self.endpoint
                    .connect_with_connector(service_fn(move |uri: Uri| {
                        tls::connect(connector.clone(), uri)
                    }))
                    .await?
            }
            Security::Plaintext | Security::Verified => self.endpoint.connect().await?,
        };
        Ok(channel)
    }
}

impl Transport for GrpcTransport {
    type Connection = GrpcConnection;

    async fn dial(&self) -> Result<GrpcConnection> {
        let channel = timeout(self.connect_timeout, self.connect_channel())
            .await
            .map_err(|_| Error::ConnectTimeout {
                addr: self.addr.clone(),
                timeout: self.connect_timeout,
            })??;

        Ok(GrpcConnection::new(channel, self.compression))
    }
}

/// A single client connection. Dropping it closes the HTTP/2 connection.
pub struct GrpcConnection {
    client: GreeterClient<Channel>,
}

impl GrpcConnection {
    fn new(channel: Channel, compression: Compression) -> Self {
        let mut client = GreeterClient::new(channel);
        if let Some(encoding) = compression.into() {
            client = client.send_compressed(encoding).accept_compressed(encoding);
        }
        Self { client }
    }
}

impl Connection for GrpcConnection {
    type Stream = GrpcStream;

    async fn say_hello(&mut self, name: &str) -> Result<String> {
        let reply = self
            .client
            .say_hello(HelloRequest {
                name: name.to_string(),
            })
            .await
            .map_err(Error::Greeting)?;
        Ok(reply.into_inner().message)
    }

    /// Prepares the `SayHelloStream` call without sending anything.
    ///
    /// The request is only issued by the first [`recv`](MessageStream::recv),
    /// so this never fails on a dialed connection: a server that rejects the
    /// RPC is reported there as [`Error::Receive`].
    async fn open_stream(&mut self) -> Result<GrpcStream> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let mut client = self.client.clone();
        let call: PendingCall =
            Box::pin(async move { client.say_hello_stream(ReceiverStream::new(rx)).await });

        Ok(GrpcStream {
            outbound: Some(tx),
            pending: Some(call),
            inbound: None,
        })
    }
}

/// Client side of one `SayHelloStream` call.
///
/// The call itself is driven lazily by the first [`recv`](MessageStream::recv);
/// until then sent messages wait in the outbound buffer.
pub struct GrpcStream {
    outbound: Option<mpsc::Sender<HelloRequest>>,
    pending: Option<PendingCall>,
    inbound: Option<Streaming<HelloReply>>,
}

impl MessageStream for GrpcStream {
    async fn send(&mut self, request: HelloRequest) -> Result<()> {
        let Some(tx) = self.outbound.as_ref() else {
            return Err(Error::Send {
                context: "send half already closed".to_string(),
            });
        };

        tx.send(request).await.map_err(|_| Error::Send {
            context: "request stream dropped by the transport".to_string(),
        })
    }

    async fn recv(&mut self) -> Result<Option<HelloReply>> {
        if let Some(call) = self.pending.take() {
            let response = call.await.map_err(Error::Receive)?;
            self.inbound = Some(response.into_inner());
        }

        match self.inbound.as_mut() {
            Some(inbound) => inbound.message().await.map_err(Error::Receive),
            None => Err(Error::Receive(Status::failed_precondition(
                "response stream is no longer available",
            ))),
        }
    }

    async fn close_send(&mut self) -> Result<()> {
        // Dropping the sender ends the request body, which the server
        // observes as end-of-stream.
        self.outbound.take();
        Ok(())
    }
}

/// Normalizes `addr` (`host:port` or a full URI) into a URI with `scheme`.
///
/// Any scheme already present in `addr` is replaced, since the TLS flags
/// decide how the connection is made.
pub fn endpoint_uri(addr: &str, scheme: &str) -> Result<Uri> {
    let trimmed = addr.trim();
    let authority = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let invalid = |reason: String| Error::InvalidEndpoint {
        addr: addr.to_string(),
        reason,
    };

    if authority.is_empty() {
        return Err(invalid("missing host".to_string()));
    }
    if authority.contains('/') {
        return Err(invalid("paths are not supported".to_string()));
    }

    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query("/")
        .build()
        .map_err(|e| invalid(e.to_string()))
}
