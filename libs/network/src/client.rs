//! Minimal RPC client
//!
//! Writes request envelopes over one connection and correlates responses
//! by request id. Responses may arrive in any order; each caller waits on
//! its own oneshot channel. Frames that match no pending request (for
//! example a registry broadcast) are queued for [`RpcClient::next_unsolicited`].

use crate::config::ListenAddress;
use crate::error::{PayloadError, Result, TransportError};
use crate::message::{decode_typed, encode_typed, TypedMessage};
use crate::protocol::FailureKind;
use crate::transports::{FrameReader, FrameWriter};
use bytes::Bytes;
use codec::{Envelope, RequestId};
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CLIENT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Error response returned by the server
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message_type}: {message}")]
pub struct RemoteError {
    /// Classification, when the type name is a known failure kind
    pub kind: Option<FailureKind>,
    pub message_type: String,
    pub message: String,
}

impl RemoteError {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            kind: FailureKind::from_type_name(envelope.message_type()),
            message_type: envelope.message_type().to_string(),
            message: envelope.error_message().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("remote error: {0}")]
    Remote(RemoteError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

type Pending = Arc<DashMap<RequestId, oneshot::Sender<Envelope>>>;

pub struct RpcClient {
    frames: mpsc::UnboundedSender<Bytes>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    unsolicited: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    reader: JoinHandle<()>,
}

impl RpcClient {
    pub async fn connect(address: &ListenAddress) -> Result<Self> {
        match address {
            ListenAddress::Tcp { address } => {
                let stream = TcpStream::connect(address).await.map_err(|e| {
                    TransportError::network_with_source(format!("Failed to connect to {address}"), e)
                })?;
                stream.set_nodelay(true)?;
                Ok(Self::from_stream(stream))
            }
            ListenAddress::Unix { path } => Self::connect_unix(path).await,
        }
    }

    pub async fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await.map_err(|e| {
            TransportError::network_with_source("Failed to connect to Unix socket", e)
        })?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (frames, mut outgoing) = mpsc::unbounded_channel::<Bytes>();
        let (unsolicited_tx, unsolicited) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            let mut writer = FrameWriter::new(write_half);
            while let Some(frame) = outgoing.recv().await {
                if let Err(err) = writer.write_frame(&frame).await {
                    debug!(error = %err, "Client writer stopped");
                    return;
                }
            }
            let _ = writer.shutdown().await;
        });

        let reader = tokio::spawn(read_responses(
            FrameReader::new(read_half, CLIENT_MAX_FRAME_SIZE),
            pending.clone(),
            closed.clone(),
            unsolicited_tx,
        ));

        Self {
            frames,
            pending,
            closed,
            unsolicited: Mutex::new(unsolicited),
            reader,
        }
    }

    /// Send a request with a fresh id and wait for its response
    pub async fn call(&self, message_type: &str, payload: impl Into<Bytes>) -> Result<Envelope> {
        self.call_envelope(Envelope::ok(RequestId::random(), message_type, payload))
            .await
    }

    /// Send `request` as-is and wait for the response carrying its id
    pub async fn call_envelope(&self, request: Envelope) -> Result<Envelope> {
        let request_id = request.request_id();
        let frame = request.encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        // Checked after inserting: the reader sets the flag before failing waiters
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&request_id);
            return Err(TransportError::ConnectionClosed);
        }
        if let Err(err) = self.send_raw(frame) {
            self.pending.remove(&request_id);
            return Err(err);
        }

        rx.await.map_err(|_| TransportError::ConnectionClosed)
    }

    /// Typed request/response; error envelopes become [`ClientError::Remote`]
    pub async fn call_typed<Req, Resp>(&self, request: &Req) -> std::result::Result<Resp, ClientError>
    where
        Req: TypedMessage,
        Resp: TypedMessage,
    {
        let response = self.call(Req::MESSAGE_TYPE, encode_typed(request)?).await?;
        if response.is_error() {
            return Err(ClientError::Remote(RemoteError::from_envelope(&response)));
        }
        if response.message_type() != Resp::MESSAGE_TYPE {
            return Err(PayloadError::Decode(format!(
                "expected '{}', got '{}'",
                Resp::MESSAGE_TYPE,
                response.message_type()
            ))
            .into());
        }
        Ok(decode_typed(response.payload())?)
    }

    /// Write an arbitrary frame without registering a pending request
    pub fn send_raw(&self, frame: Bytes) -> Result<()> {
        self.frames
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Next frame that answered no pending request; `None` once disconnected
    pub async fn next_unsolicited(&self) -> Option<Envelope> {
        self.unsolicited.lock().await.recv().await
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_responses<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    unsolicited: mpsc::UnboundedSender<Envelope>,
) {
    loop {
        match reader.next_frame().await {
            Ok(Some(frame)) => match Envelope::decode(&frame) {
                Ok(envelope) => match pending.remove(&envelope.request_id()) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(envelope);
                    }
                    None => {
                        let _ = unsolicited.send(envelope);
                    }
                },
                Err(err) => warn!(error = %err, "Client received undecodable frame"),
            },
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "Client reader stopped");
                break;
            }
        }
    }
    // Fail every waiter still pending
    closed.store(true, Ordering::SeqCst);
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_recognises_failure_kinds() {
        let envelope = Envelope::error(
            RequestId::from_parts(1, 2),
            FailureKind::MalformedPayload.type_name(),
            "bad bytes",
        );
        let remote = RemoteError::from_envelope(&envelope);

        assert_eq!(remote.kind, Some(FailureKind::MalformedPayload));
        assert_eq!(remote.message, "bad bytes");
    }

    #[tokio::test]
    async fn test_responses_are_matched_by_id() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let client = Arc::new(RpcClient::from_stream(client_side));

        // Echo server answering in reverse order
        let server = tokio::spawn(async move {
            let (read_half, write_half) = tokio::io::split(server_side);
            let mut reader = FrameReader::new(read_half, 1024);
            let mut writer = FrameWriter::new(write_half);
            let first = Envelope::decode(&reader.next_frame().await.unwrap().unwrap()).unwrap();
            let second = Envelope::decode(&reader.next_frame().await.unwrap().unwrap()).unwrap();
            for request in [second, first] {
                let reply = Envelope::ok(request.request_id(), "test.Reply", request.into_payload());
                writer.write_frame(&reply.encode().unwrap()).await.unwrap();
            }
        });

        let a = {
            let client = client.clone();
            tokio::spawn(async move { client.call("test.Request", vec![1]).await })
        };
        // Make sure A is written first
        while client.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
        let b = client.call("test.Request", vec![2]).await.unwrap();
        let a = a.await.unwrap().unwrap();

        assert_eq!(a.payload().as_ref(), &[1]);
        assert_eq!(b.payload().as_ref(), &[2]);
        server.await.unwrap();
    }
}
