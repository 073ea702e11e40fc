//! Dedicated writer task for sending frames.
//!
//! The write half of the session stream lives inside a single task that
//! receives frames over an mpsc channel. The task is the only owner of the
//! outbound sequence counter, so concurrent senders never race on it and
//! sequence numbers always follow wire order.
//!
//! # Architecture
//!
//! ```text
//! caller 1 ─┐
//! caller 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► TLS write half
//! caller N ─┘            ▲                         │
//!                        └──── oneshot(seq) ◄──────┘  after flush
//! ```
//!
//! Frames that are already queued when the task wakes up are written as one
//! batch and flushed once.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{OnemeError, Result};
use crate::protocol::{Frame, FrameCodec, COMMAND_REQUEST};
use crate::session::{SessionState, SharedState};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single flush.
const MAX_BATCH_SIZE: usize = 64;

/// A frame queued for the writer task, with the slot its sequence number goes to.
#[derive(Debug)]
pub struct OutboundFrame {
    frame: Frame,
    reply: oneshot::Sender<Result<u16>>,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been written and flushed.
    ///
    /// The writer overwrites `command` with the request marker and assigns the
    /// next sequence number, which is returned.
    pub async fn send(&self, frame: Frame) -> Result<u16> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(OutboundFrame { frame, reply })
            .await
            .map_err(|_| OnemeError::ConnectionClosed)?;

        done.await.map_err(|_| OnemeError::ConnectionClosed)?
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task stops when every handle is dropped or the session state becomes
/// `Closed`. A write error closes the session.
pub(crate) fn spawn_writer_task<W>(
    writer: W,
    codec: FrameCodec,
    config: WriterConfig,
    state: SharedState,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer, codec, state, 0));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames, stamps sequence numbers and writes them.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    codec: FrameCodec,
    state: SharedState,
    mut sequence: u16,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut closed = state.subscribe();

    loop {
        let first = tokio::select! {
            next = rx.recv() => match next {
                Some(frame) => frame,
                None => break,
            },
            _ = closed.wait_for(SessionState::is_closed) => break,
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let mut encoded = Vec::with_capacity(batch.len());
        for OutboundFrame { mut frame, reply } in batch {
            frame.command = COMMAND_REQUEST;
            frame.sequence = sequence;
            match codec.encode(&frame) {
                Ok(bytes) => {
                    tracing::trace!(frame = %frame.info(), len = bytes.len(), "frame queued");
                    encoded.push((bytes, reply, sequence));
                    sequence = sequence.wrapping_add(1);
                }
                // Encode failures are local to the caller and do not consume a sequence number.
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        }

        if let Err(e) = write_batch(&mut writer, encoded.iter().map(|(bytes, _, _)| bytes)).await {
            tracing::error!(error = %e, "write failed, closing session");
            state.close();
            for (_, reply, _) in encoded {
                let _ = reply.send(Err(OnemeError::Io(std::io::Error::new(
                    e.kind(),
                    e.to_string(),
                ))));
            }
            return Err(OnemeError::Io(e));
        }

        for (_, reply, sequence) in encoded {
            let _ = reply.send(Ok(sequence));
        }
    }

    tracing::debug!("writer task stopping");
    let _ = writer.shutdown().await;
    Ok(())
}

/// Write every frame in full, then flush once.
async fn write_batch<'a, W>(
    writer: &mut W,
    frames: impl Iterator<Item = &'a Bytes>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for bytes in frames {
        writer.write_all(bytes).await?;
    }
    writer.flush().await
}
