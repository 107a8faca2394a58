//! A single broker admin connection.
//!
//! Owns the TCP/TLS stream, frames requests with the Kafka 4-byte length
//! prefix, and matches responses to requests by correlation id. Admin
//! traffic is strictly request/response on one connection, so requests are
//! issued serially; the process-wide [`super::AdminClient`] serializes
//! access and replaces the connection when it reports a transport error.

use std::io;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{ApiKey, RequestHeader, ResponseHeader};
use kafka_protocol::protocol::{Decodable, Encodable, Request, StrBytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{ReconcileError, Result};
use crate::tls::TlsConnector;

use super::stream::BrokerStream;

/// An established connection to one broker.
pub(crate) struct BrokerConnection {
    address: String,
    stream: BrokerStream,
    request_timeout: Duration,
    client_id: StrBytes,
    next_correlation_id: i32,
}

impl BrokerConnection {
    /// Dial `address`, performing the TLS handshake when a connector is
    /// given. The hostname part of `address` is used for SNI.
    pub(crate) async fn open(
        address: &str,
        client_id: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
        tls: Option<&TlsConnector>,
    ) -> Result<Self> {
        let tcp = match timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(address, error = %e, "failed to connect to broker");
                return Err(ReconcileError::Connection(e));
            }
            Err(_) => {
                warn!(address, "connection timed out");
                return Err(ReconcileError::Connection(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {address}"),
                )));
            }
        };
        tcp.set_nodelay(true).map_err(ReconcileError::Connection)?;

        let stream = match tls {
            Some(connector) => {
                let server_name = address.split(':').next().unwrap_or(address);
                debug!(address, server_name, "performing TLS handshake");
                let tls_stream = connector.connect(server_name, tcp).await?;
                BrokerStream::tls(tls_stream)
            }
            None => BrokerStream::plain(tcp),
        };

        debug!(address, "connected to broker");
        Ok(Self {
            address: address.to_string(),
            stream,
            request_timeout,
            client_id: StrBytes::from_string(client_id.to_string()),
            next_correlation_id: 0,
        })
    }

    /// The broker address this connection is dialed to.
    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    /// Issue a typed request and decode the typed response.
    ///
    /// Any transport error leaves the stream in an undefined state; the
    /// caller must discard this connection when this returns
    /// `Connection` or `Protocol`.
    pub(crate) async fn send<R>(
        &mut self,
        api_key: ApiKey,
        version: i16,
        request: &R,
    ) -> Result<R::Response>
    where
        R: Request + Encodable,
        R::Response: Decodable,
    {
        let correlation_id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);

        let mut header = RequestHeader::default();
        header.request_api_key = api_key as i16;
        header.request_api_version = version;
        header.correlation_id = correlation_id;
        header.client_id = Some(self.client_id.clone());

        let mut buf = BytesMut::new();
        header
            .encode(&mut buf, super::REQUEST_HEADER_VERSION)
            .map_err(|e| ReconcileError::protocol(format!("encoding request header: {e}")))?;
        request
            .encode(&mut buf, version)
            .map_err(|e| ReconcileError::protocol(format!("encoding {api_key:?} request: {e}")))?;

        debug!(
            broker = %self.address,
            api = ?api_key,
            version,
            correlation_id,
            "sending request"
        );

        let mut body = self.roundtrip(&buf).await?;

        let response_header = ResponseHeader::decode(&mut body, super::RESPONSE_HEADER_VERSION)
            .map_err(|e| ReconcileError::protocol(format!("decoding response header: {e}")))?;
        if response_header.correlation_id != correlation_id {
            return Err(ReconcileError::protocol(format!(
                "correlation id mismatch: expected {correlation_id}, got {}",
                response_header.correlation_id
            )));
        }

        R::Response::decode(&mut body, version)
            .map_err(|e| ReconcileError::protocol(format!("decoding {api_key:?} response: {e}")))
    }

    /// Write one length-prefixed frame and read the response frame.
    async fn roundtrip(&mut self, request: &[u8]) -> Result<Bytes> {
        let mut framed = BytesMut::with_capacity(4 + request.len());
        framed.put_u32(request.len() as u32);
        framed.extend_from_slice(request);

        let request_timeout = self.request_timeout;
        let stream = &mut self.stream;
        let outcome = timeout(request_timeout, async move {
            stream.write_all(&framed).await?;
            stream.flush().await?;

            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await?;
            let response_len = u32::from_be_bytes(len_buf) as usize;

            let mut response = vec![0u8; response_len];
            stream.read_exact(&mut response).await?;
            Ok::<_, io::Error>(response)
        })
        .await;

        match outcome {
            Ok(Ok(response)) => Ok(Bytes::from(response)),
            Ok(Err(e)) => Err(ReconcileError::Connection(e)),
            Err(_) => Err(ReconcileError::Connection(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("request to {}", self.address),
            ))),
        }
    }
}
