//! Per-connection I/O
//!
//! Each accepted stream is split in two tasks:
//!
//! - the **reader** (`serve_connection`) reads frames and feeds them to the
//!   [`RequestPipeline`]; it never waits on business logic
//! - the **writer** owns the write half and drains a command queue
//!
//! [`ConnectionHandle`] is the only way to write. It is cheap to clone and
//! safe to use from any thread, which is how responses produced on worker
//! threads reach the socket.

use crate::config::ResponseOrdering;
use crate::error::{Result, TransportError};
use crate::protocol::{InboundDecoder, InboundError, OutboundFrame, RequestPipeline};
use crate::transports::framing::{FrameReader, FrameWriter};
use crate::transports::sequencer::ResponseSequencer;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug)]
pub(crate) enum WriterCommand {
    /// Response to a request, subject to response ordering
    Response(OutboundFrame),
    /// Sequence that will never produce a response
    Skip(u64),
    /// Unsolicited frame written as soon as it is dequeued
    Raw(Bytes),
    /// Close once this many sequences have been answered or skipped
    Drain(u64),
    Close,
}

struct HandleInner {
    id: ConnectionId,
    peer: String,
    commands: mpsc::UnboundedSender<WriterCommand>,
    open: AtomicBool,
}

/// Thread-safe write capability for one connection
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    pub(crate) fn channel(peer: String) -> (Self, mpsc::UnboundedReceiver<WriterCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            inner: Arc::new(HandleInner {
                id: ConnectionId::new(),
                peer,
                commands,
                open: AtomicBool::new(true),
            }),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// False once the connection has been closed from either side
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire) && !self.inner.commands.is_closed()
    }

    /// Queue a response for writing
    pub fn send_response(&self, frame: OutboundFrame) -> Result<()> {
        self.enqueue(WriterCommand::Response(frame))
    }

    /// Queue an unsolicited frame, bypassing response ordering
    pub fn send(&self, bytes: Bytes) -> Result<()> {
        self.enqueue(WriterCommand::Raw(bytes))
    }

    pub(crate) fn skip_response(&self, sequence: u64) {
        let _ = self.enqueue(WriterCommand::Skip(sequence));
    }

    /// Close once the first `accepted` sequences are answered or skipped;
    /// writes stay possible until then
    pub(crate) fn finish(&self, accepted: u64) {
        let _ = self.enqueue(WriterCommand::Drain(accepted));
    }

    /// Close after already-queued frames are written
    pub fn close(&self) {
        if self.inner.open.swap(false, Ordering::AcqRel) {
            let _ = self.inner.commands.send(WriterCommand::Close);
        }
    }

    fn enqueue(&self, command: WriterCommand) -> Result<()> {
        if !self.inner.open.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        self.inner.commands.send(command).map_err(|_| {
            self.inner.open.store(false, Ordering::Release);
            TransportError::ConnectionClosed
        })
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Settings shared by every connection of a server
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionSettings {
    pub max_frame_size: usize,
    pub ordering: ResponseOrdering,
}

/// Drain the command queue into the write half
async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    ordering: ResponseOrdering,
) -> Result<()> {
    let mut sequencer = match ordering {
        ResponseOrdering::Receipt => Some(ResponseSequencer::new()),
        ResponseOrdering::Completion => None,
    };
    let mut answered: u64 = 0;
    let mut drain_until: Option<u64> = None;

    while let Some(command) = commands.recv().await {
        if matches!(command, WriterCommand::Response(_) | WriterCommand::Skip(_)) {
            answered += 1;
        }
        match command {
            WriterCommand::Response(frame) => match sequencer.as_mut() {
                Some(sequencer) => {
                    for bytes in sequencer.complete(frame.sequence, Some(frame.bytes)) {
                        writer.write_frame(&bytes).await?;
                    }
                }
                None => writer.write_frame(&frame.bytes).await?,
            },
            WriterCommand::Skip(sequence) => {
                if let Some(sequencer) = sequencer.as_mut() {
                    for bytes in sequencer.complete(sequence, None) {
                        writer.write_frame(&bytes).await?;
                    }
                }
            }
            WriterCommand::Raw(bytes) => writer.write_frame(&bytes).await?,
            WriterCommand::Drain(accepted) => {
                debug!(accepted, answered, "Draining in-flight responses");
                drain_until = Some(accepted);
            }
            WriterCommand::Close => break,
        }
        if drain_until.is_some_and(|accepted| answered >= accepted) {
            break;
        }
    }

    if let Some(sequencer) = &sequencer {
        if sequencer.buffered() > 0 {
            debug!(buffered = sequencer.buffered(), "Discarding held responses on close");
        }
    }
    writer.shutdown().await
}

/// Serve one connection until the peer leaves, a transport failure occurs,
/// or `shutdown` fires
///
/// When the peer only stops sending, responses to requests already accepted
/// are still written before the connection closes.
#[instrument(
    name = "connection",
    skip_all,
    fields(connection = %handle.id(), peer = %handle.peer())
)]
pub(crate) async fn serve_connection<S>(
    stream: S,
    handle: ConnectionHandle,
    commands: mpsc::UnboundedReceiver<WriterCommand>,
    pipeline: Arc<RequestPipeline>,
    settings: ConnectionSettings,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    info!("Connection opened");
    let (read_half, write_half) = tokio::io::split(stream);
    let writer = tokio::spawn(run_writer(
        FrameWriter::new(write_half),
        commands,
        settings.ordering,
    ));

    let mut reader = FrameReader::new(read_half, settings.max_frame_size);
    let mut decoder = InboundDecoder::new();
    let mut peer_finished = false;

    loop {
        tokio::select! {
            frame = reader.next_frame() => match frame {
                Ok(Some(frame)) => {
                    let received_at = Instant::now();
                    debug!(bytes = frame.len(), "Frame received");
                    match pipeline.on_frame(frame, received_at, &mut decoder, &handle) {
                        Ok(()) => {}
                        Err(err @ InboundError::Rejected { .. }) => {
                            warn!(error = %err, "Request rejected");
                        }
                        Err(InboundError::Dropped(err)) => {
                            warn!(kind = err.kind(), error = %err, "Dropping undecodable frame");
                        }
                    }
                }
                Ok(None) => {
                    debug!("Peer finished sending");
                    peer_finished = true;
                    break;
                }
                Err(err) if err.is_disconnect() => {
                    debug!(error = %err, "Peer disconnected");
                    break;
                }
                Err(err) => {
                    error!(category = err.category(), error = %err, "Transport failure, closing connection");
                    break;
                }
            },
            _ = shutdown.changed() => {
                debug!("Server shutting down");
                break;
            }
        }
    }

    // A half-closed peer may still be reading its responses
    if peer_finished {
        handle.finish(decoder.accepted());
    } else {
        handle.close();
    }
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.is_disconnect() => debug!(error = %err, "Writer stopped"),
        Ok(Err(err)) => error!(category = err.category(), error = %err, "Writer failed"),
        Err(err) => error!(error = %err, "Writer task aborted"),
    }
    handle.close();
    info!(
        frames = reader.frames_read(),
        requests = decoder.accepted(),
        "Connection closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_rejects_writes_after_close() {
        let (handle, mut commands) = ConnectionHandle::channel("peer".into());
        assert!(handle.is_open());

        handle.send(Bytes::from_static(b"hello")).unwrap();
        handle.close();
        handle.close();

        assert!(!handle.is_open());
        assert!(matches!(
            handle.send(Bytes::from_static(b"late")),
            Err(TransportError::ConnectionClosed)
        ));
        assert!(matches!(commands.try_recv(), Ok(WriterCommand::Raw(_))));
        assert!(matches!(commands.try_recv(), Ok(WriterCommand::Close)));
        assert!(commands.try_recv().is_err());
    }

    #[test]
    fn test_dropped_writer_marks_handle_closed() {
        let (handle, commands) = ConnectionHandle::channel("peer".into());
        drop(commands);

        assert!(!handle.is_open());
        assert!(handle.send(Bytes::new()).is_err());
    }

    #[tokio::test]
    async fn test_writer_releases_in_receipt_order() {
        use crate::transports::framing::FrameReader;

        let (client, server) = tokio::io::duplex(1024);
        let (handle, commands) = ConnectionHandle::channel("peer".into());
        let writer = tokio::spawn(run_writer(
            FrameWriter::new(server),
            commands,
            ResponseOrdering::Receipt,
        ));

        for (sequence, tag) in [(2u64, "c"), (0, "a"), (1, "b")] {
            handle
                .send_response(OutboundFrame {
                    sequence,
                    bytes: Bytes::from_static(tag.as_bytes()),
                })
                .unwrap();
        }
        handle.close();
        writer.await.unwrap().unwrap();

        let mut reader = FrameReader::new(client, 1024);
        let mut seen = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            seen.push(frame);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_writer_drains_outstanding_responses_before_closing() {
        let (client, server) = tokio::io::duplex(1024);
        let (handle, commands) = ConnectionHandle::channel("peer".into());
        let writer = tokio::spawn(run_writer(
            FrameWriter::new(server),
            commands,
            ResponseOrdering::Completion,
        ));

        handle
            .send_response(OutboundFrame {
                sequence: 0,
                bytes: Bytes::from_static(b"a"),
            })
            .unwrap();
        handle.finish(3);
        handle.skip_response(1);
        tokio::task::yield_now().await;
        assert!(!writer.is_finished());
        assert!(handle.is_open());

        handle
            .send_response(OutboundFrame {
                sequence: 2,
                bytes: Bytes::from_static(b"c"),
            })
            .unwrap();
        writer.await.unwrap().unwrap();

        let mut reader = FrameReader::new(client, 1024);
        let mut seen = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            seen.push(frame);
        }
        assert_eq!(seen, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_drain_with_nothing_outstanding_closes_at_once() {
        let (_client, server) = tokio::io::duplex(1024);
        let (handle, commands) = ConnectionHandle::channel("peer".into());
        let writer = tokio::spawn(run_writer(
            FrameWriter::new(server),
            commands,
            ResponseOrdering::Receipt,
        ));

        handle.finish(0);
        writer.await.unwrap().unwrap();
    }
}
