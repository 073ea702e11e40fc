//! Session builder and runtime loop.
//!
//! The [`SessionBuilder`] collects configuration and an optional frame
//! handler, then connects. A [`Session`] owns one TLS connection:
//! 1. TCP connect with timeout (`Connecting`)
//! 2. TLS 1.3 handshake with SNI (`Handshaking`)
//! 3. Writer task and receive loop are spawned (`Open`)
//! 4. End-of-stream, an I/O error or [`Session::close`] ends it (`Closed`)
//!
//! # Example
//!
//! ```ignore
//! use oneme_client::payloads::SessionInit;
//! use oneme_client::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder().connect().await?;
//!
//!     let seq = session.send(SessionInit::default().into_frame()?).await?;
//!     println!("session init sent as #{seq}");
//!
//!     while let Some(frame) = session.recv().await {
//!         println!("{}", frame?.info());
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::codec::Value;
use crate::compress::BoxedCompressor;
use crate::error::{OnemeError, Result};
use crate::protocol::{
    Frame, FrameBuffer, FrameCodec, COMPRESSION_THRESHOLD, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_PROTOCOL_VERSION,
};
use crate::transport::{connect_tcp, default_tls_config, handshake};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default server host.
pub const DEFAULT_HOST: &str = "api.oneme.ru";

/// Default server port.
pub const DEFAULT_PORT: u16 = 443;

/// Default bound on TCP connect and TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default socket read size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Handshaking,
    Open,
    Closed,
}

impl SessionState {
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// Session state shared by the session, its writer task and its receive loop.
#[derive(Clone)]
pub(crate) struct SharedState(Arc<watch::Sender<SessionState>>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(watch::Sender::new(SessionState::Idle)))
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.0.borrow()
    }

    /// Move to `next` unless the session is already closed.
    pub(crate) fn set(&self, next: SessionState) {
        self.0.send_if_modified(|current| {
            if current.is_closed() || *current == next {
                return false;
            }
            tracing::debug!(from = ?current, to = ?next, "session state");
            *current = next;
            true
        });
    }

    /// Close the session. Returns `true` only for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        self.0.send_if_modified(|current| {
            if current.is_closed() {
                return false;
            }
            tracing::debug!(from = ?current, to = ?SessionState::Closed, "session state");
            *current = SessionState::Closed;
            true
        })
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.0.subscribe()
    }
}

/// Receives inbound frames on the session's receive task.
///
/// Handlers run synchronously on the receive loop; a slow handler delays
/// every frame behind it. Closures `Fn(Frame)` implement this trait.
pub trait FrameHandler: Send + Sync + 'static {
    /// A complete, decoded frame arrived.
    fn on_frame(&self, frame: Frame);

    /// A frame could not be decoded, or the stream ended.
    fn on_error(&self, error: &OnemeError) {
        tracing::warn!(%error, "receive error");
    }
}

impl<F> FrameHandler for F
where
    F: Fn(Frame) + Send + Sync + 'static,
{
    fn on_frame(&self, frame: Frame) {
        self(frame)
    }
}

/// Resolved session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Bound on TCP connect and, separately, on the TLS handshake.
    pub connect_timeout: Duration,
    /// Version byte written by [`Session::send_value`] and [`Session::send_payload`].
    pub protocol_version: u8,
    pub compression_threshold: usize,
    /// Ceiling for inbound bodies, on the wire and decompressed.
    pub max_body_size: usize,
    pub read_buffer_size: usize,
    /// Capacity of the writer queue and of the inbound queue.
    pub channel_capacity: usize,
    /// Overrides the default TLS 1.3 configuration.
    pub tls_config: Option<Arc<ClientConfig>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            compression_threshold: COMPRESSION_THRESHOLD,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            tls_config: None,
        }
    }
}

/// Builder for configuring and connecting a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    compressor: BoxedCompressor,
    handler: Option<Arc<dyn FrameHandler>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            compressor: BoxedCompressor::default(),
            handler: None,
        }
    }

    /// Default: `api.oneme.ru`
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Default: 443
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Default: 10
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Default: 32 bytes
    pub fn compression_threshold(mut self, threshold: usize) -> Self {
        self.config.compression_threshold = threshold;
        self
    }

    /// Default: 16 MiB
    pub fn max_body_size(mut self, max: usize) -> Self {
        self.config.max_body_size = max;
        self
    }

    /// Default: 8 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Use a custom TLS client configuration, e.g. one trusting a private CA.
    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.config.tls_config = Some(config);
        self
    }

    /// Replace the LZ4 body compressor.
    pub fn compressor(mut self, compressor: BoxedCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    /// Deliver inbound frames to `handler` instead of [`Session::recv`].
    pub fn handler<H: FrameHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect, handshake and start the session.
    ///
    /// Any network failure closes the attempt and is returned as
    /// `ConnectFailed`; nothing is retried. A default TLS configuration that
    /// cannot be built is returned as `Tls`.
    pub async fn connect(self) -> Result<Session> {
        let state = SharedState::new();
        let config = &self.config;
        tracing::info!(host = %config.host, port = config.port, "connecting");

        let tls_config = match config.tls_config.clone() {
            Some(tls_config) => tls_config,
            None => default_tls_config().inspect_err(|e| {
                tracing::warn!(error = %e, "TLS configuration failed");
                state.close();
            })?,
        };

        state.set(SessionState::Connecting);
        let tcp = connect_tcp(&config.host, config.port, config.connect_timeout)
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, "connect failed");
                state.close();
            })?;

        state.set(SessionState::Handshaking);
        let stream = handshake(
            tcp,
            &config.host,
            config.port,
            tls_config,
            config.connect_timeout,
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(error = %e, "TLS handshake failed");
            state.close();
        })?;

        Ok(self.start(stream, state))
    }

    /// Start a session over an already established stream.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn open<S>(self, stream: S) -> Session
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.start(stream, SharedState::new())
    }

    fn start<S>(self, stream: S, state: SharedState) -> Session
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = self.config;
        let codec = FrameCodec::new(self.compressor)
            .with_compression_threshold(config.compression_threshold)
            .with_max_body_size(config.max_body_size);

        let (read_half, write_half) = tokio::io::split(stream);

        let (writer, writer_task) = spawn_writer_task(
            write_half,
            codec.clone(),
            WriterConfig {
                channel_capacity: config.channel_capacity,
            },
            state.clone(),
        );

        let (inbound, queue) = match self.handler {
            Some(handler) => (Inbound::Handler(handler), None),
            None => {
                let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
                (Inbound::Queue(tx), Some(rx))
            }
        };

        let frames = FrameBuffer::with_capacity_and_max_body(
            config.read_buffer_size,
            codec.max_body_size(),
        );

        state.set(SessionState::Open);
        tracing::info!(host = %config.host, port = config.port, "session open");

        let reader_task = tokio::spawn(read_loop(
            read_half,
            codec,
            frames,
            config.read_buffer_size.max(1),
            inbound,
            state.clone(),
        ));

        Session {
            config,
            state,
            writer,
            queue,
            reader_task,
            _writer_task: writer_task,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the receive loop delivers frames.
enum Inbound {
    Handler(Arc<dyn FrameHandler>),
    Queue(mpsc::Sender<Result<Frame>>),
}

impl Inbound {
    async fn deliver(&self, item: Result<Frame>) {
        match (self, item) {
            (Inbound::Handler(handler), Ok(frame)) => handler.on_frame(frame),
            (Inbound::Handler(handler), Err(e)) => handler.on_error(&e),
            (Inbound::Queue(tx), item) => {
                if tx.send(item).await.is_err() {
                    tracing::trace!("inbound queue dropped");
                }
            }
        }
    }
}

/// Receive loop - reads the stream, cuts frames and delivers them.
///
/// Runs until end-of-stream, an I/O error, a framing error or session close.
/// The session is closed before the terminal error is delivered, and the
/// error is dropped if the queue is full. A close requested by the caller is
/// not reported.
async fn read_loop<R>(
    mut reader: R,
    codec: FrameCodec,
    mut frames: FrameBuffer,
    read_buffer_size: usize,
    inbound: Inbound,
    state: SharedState,
) where
    R: AsyncRead + Unpin,
{
    let mut closed = state.subscribe();
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            _ = closed.wait_for(SessionState::is_closed) => {
                tracing::debug!("receive loop stopped by close");
                return;
            }
        };

        let n = match read {
            Ok(0) => {
                tracing::info!("server closed the connection");
                terminate(&state, &inbound, OnemeError::ConnectionClosed);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "read failed, closing session");
                terminate(&state, &inbound, OnemeError::Io(e));
                return;
            }
        };

        let wires = match frames.push(&buf[..n]) {
            Ok(wires) => wires,
            Err(e) => {
                // Stream position is lost once a header is rejected.
                tracing::error!(error = %e, "unframeable input, closing session");
                terminate(&state, &inbound, e);
                return;
            }
        };

        for wire in wires {
            match codec.decode_bytes(wire) {
                Ok(frame) => {
                    tracing::debug!(frame = %frame.info(), len = frame.body_len(), "frame received");
                    inbound.deliver(Ok(frame)).await;
                }
                Err(e) if e.is_fatal_to_session() => {
                    tracing::error!(error = %e, "frame decode failed, closing session");
                    terminate(&state, &inbound, e);
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable frame");
                    inbound.deliver(Err(e)).await;
                }
            }
        }
    }
}

/// Close the session and report the terminal error once.
///
/// The queue may be full with frames the caller has not read yet; the error
/// is then dropped rather than holding the session open.
fn terminate(state: &SharedState, inbound: &Inbound, error: OnemeError) {
    if state.get().is_closed() {
        return;
    }
    match inbound {
        Inbound::Handler(handler) => {
            handler.on_error(&error);
            state.close();
        }
        Inbound::Queue(tx) => {
            state.close();
            if let Err(e) = tx.try_send(Err(error)) {
                tracing::debug!(reason = %e, "terminal error not queued");
            }
        }
    }
}

/// A live session.
///
/// Dropping the session closes it.
pub struct Session {
    config: SessionConfig,
    state: SharedState,
    writer: WriterHandle,
    queue: Option<mpsc::Receiver<Result<Frame>>>,
    reader_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Send a frame and wait until it is flushed.
    ///
    /// The frame goes out as a request (`command = 0`) with the next sequence
    /// number, which is returned. Sequence numbers start at 0 and wrap.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` unless the session is open; `Io` if the write fails,
    /// which also closes the session.
    pub async fn send(&self, frame: Frame) -> Result<u16> {
        if self.state() != SessionState::Open {
            return Err(OnemeError::ConnectionClosed);
        }
        let opcode = frame.opcode;
        let sequence = self.writer.send(frame).await.inspect_err(|e| {
            if e.is_fatal_to_session() {
                self.close();
            }
        })?;
        tracing::debug!(sequence, opcode, "frame sent");
        Ok(sequence)
    }

    /// Send a [`Value`] body under `opcode`.
    pub async fn send_value(&self, opcode: u16, value: &Value) -> Result<u16> {
        let frame = Frame::from_value(opcode, value).with_version(self.config.protocol_version);
        self.send(frame).await
    }

    /// Send a serde payload, encoded as a map, under `opcode`.
    pub async fn send_payload<T: serde::Serialize + ?Sized>(
        &self,
        opcode: u16,
        payload: &T,
    ) -> Result<u16> {
        let frame = Frame::from_payload(opcode, payload)?.with_version(self.config.protocol_version);
        self.send(frame).await
    }

    /// Next inbound frame or receive error.
    ///
    /// Returns `None` once the session is closed and the queue is drained, and
    /// always when a [`FrameHandler`] was registered.
    pub async fn recv(&mut self) -> Option<Result<Frame>> {
        match self.queue.as_mut() {
            Some(queue) => queue.recv().await,
            None => None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Wait until the session is closed, by either side.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(SessionState::is_closed).await;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Close the session. Safe to call any number of times.
    pub fn close(&self) {
        if self.state.close() {
            tracing::info!(host = %self.config.host, "session closed");
        }
        // Delivery may be parked on a full inbound queue.
        self.reader_task.abort();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HEADER_SIZE;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn wire(opcode: u16, sequence: u16, body: &[u8]) -> Vec<u8> {
        Frame::new(opcode, body.to_vec())
            .with_command(1)
            .with_sequence(sequence)
            .to_bytes()
            .unwrap()
            .to_vec()
    }

    fn open_session() -> (Session, DuplexStream) {
        let (client, server) = duplex(64 * 1024);
        (Session::builder().open(client), server)
    }

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::new();
        let config = builder.config();
        assert_eq!(config.host, "api.oneme.ru");
        assert_eq!(config.port, 443);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.protocol_version, 10);
        assert_eq!(config.compression_threshold, 32);
        assert_eq!(config.max_body_size, 16 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, 8 * 1024);
        assert_eq!(config.channel_capacity, 1024);
        assert!(config.tls_config.is_none());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Session::builder()
            .host("localhost")
            .port(8443)
            .connect_timeout(Duration::from_secs(1))
            .protocol_version(11)
            .compression_threshold(64)
            .max_body_size(1024)
            .read_buffer_size(512)
            .channel_capacity(8);

        let config = builder.config();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8443);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.protocol_version, 11);
        assert_eq!(config.compression_threshold, 64);
        assert_eq!(config.max_body_size, 1024);
        assert_eq!(config.read_buffer_size, 512);
        assert_eq!(config.channel_capacity, 8);
    }

    #[test]
    fn test_closed_state_is_terminal() {
        let state = SharedState::new();
        assert_eq!(state.get(), SessionState::Idle);

        state.set(SessionState::Connecting);
        assert!(state.close());
        assert!(!state.close());

        state.set(SessionState::Open);
        assert_eq!(state.get(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_two_frames_in_one_read() {
        let (mut session, mut server) = open_session();
        assert_eq!(session.state(), SessionState::Open);

        let mut bytes = wire(1, 10, b"first");
        bytes.extend(wire(2, 11, b"second"));
        server.write_all(&bytes).await.unwrap();

        let first = session.recv().await.unwrap().unwrap();
        let second = session.recv().await.unwrap().unwrap();
        assert_eq!((first.opcode, first.sequence), (1, 10));
        assert_eq!(first.command, 1);
        assert_eq!(first.body(), b"first");
        assert_eq!((second.opcode, second.sequence), (2, 11));
        assert_eq!(second.body(), b"second");
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let (mut session, mut server) = open_session();
        let bytes = wire(5, 0, b"split body");

        server.write_all(&bytes[..HEADER_SIZE]).await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(50), session.recv()).await;
        assert!(pending.is_err(), "no frame before the body arrives");

        server.write_all(&bytes[HEADER_SIZE..]).await.unwrap();
        let frame = session.recv().await.unwrap().unwrap();
        assert_eq!(frame.opcode, 5);
        assert_eq!(frame.body(), b"split body");
    }

    #[tokio::test]
    async fn test_send_sequences_start_at_zero() {
        let (session, mut server) = open_session();

        for expected in 0..3u16 {
            let seq = session
                .send_value(17, &Value::map([("n", expected)]))
                .await
                .unwrap();
            assert_eq!(seq, expected);
        }

        let mut buffer = FrameBuffer::new();
        let mut received = Vec::new();
        let mut buf = vec![0u8; 1024];
        while received.len() < 3 {
            let n = server.read(&mut buf).await.unwrap();
            received.extend(buffer.push(&buf[..n]).unwrap());
        }
        for (i, wire) in received.iter().enumerate() {
            let frame = Frame::from_bytes(wire).unwrap();
            assert_eq!(frame.sequence, i as u16);
            assert_eq!(frame.command, 0);
            assert_eq!(frame.version, 10);
            assert_eq!(frame.decode_body().unwrap().get("n"), Some(&Value::Int(i as i64)));
        }
    }

    #[tokio::test]
    async fn test_send_payload_uses_configured_version() {
        let (client, mut server) = duplex(4096);
        let session = Session::builder().protocol_version(11).open(client);

        #[derive(serde::Serialize)]
        struct Ping {
            ok: bool,
        }
        session.send_payload(1, &Ping { ok: true }).await.unwrap();

        let mut header = [0u8; HEADER_SIZE];
        server.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 11);
    }

    #[tokio::test]
    async fn test_end_of_stream_closes_session() {
        let (mut session, server) = open_session();
        drop(server);

        assert!(matches!(
            session.recv().await,
            Some(Err(OnemeError::ConnectionClosed))
        ));
        assert!(session.recv().await.is_none());
        session.closed().await;
        assert_eq!(session.state(), SessionState::Closed);

        let result = session.send(Frame::new(1, Bytes::new())).await;
        assert!(matches!(result, Err(OnemeError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_end_of_stream_with_full_queue_closes_session() {
        let (client, mut server) = duplex(4096);
        let mut session = Session::builder().channel_capacity(1).open(client);

        server.write_all(&wire(9, 0, b"unread")).await.unwrap();
        drop(server);

        tokio::time::timeout(Duration::from_millis(500), session.closed())
            .await
            .expect("session closes while the queue is full");
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.send(Frame::new(1, Bytes::new())).await,
            Err(OnemeError::ConnectionClosed)
        ));

        // The queued frame is still delivered; the terminal error did not fit.
        let frame = session.recv().await.unwrap().unwrap();
        assert_eq!(frame.opcode, 9);
        assert!(session.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_failure_closes_session() {
        let (session, server) = open_session();
        drop(server);

        let result = session.send(Frame::new(1, Bytes::new())).await;
        assert!(result.is_err_and(|e| e.is_fatal_to_session()));
        session.closed().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_corrupt_frame_is_dropped_and_loop_continues() {
        let (mut session, mut server) = open_session();

        let header = crate::protocol::Header {
            version: 10,
            command: 1,
            sequence: 0,
            opcode: 3,
            flags: 4,
            length: 2,
        };
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(&[0xF0, 0xFF]);
        bytes.extend(wire(4, 1, b"still here"));
        server.write_all(&bytes).await.unwrap();

        assert!(matches!(
            session.recv().await,
            Some(Err(OnemeError::DecompressionFailed(_)))
        ));
        let frame = session.recv().await.unwrap().unwrap();
        assert_eq!(frame.opcode, 4);
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn test_oversized_header_closes_session() {
        let (client, mut server) = duplex(4096);
        let mut session = Session::builder().max_body_size(16).open(client);

        server.write_all(&wire(1, 0, &[7u8; 20][..])).await.unwrap();

        assert!(matches!(
            session.recv().await,
            Some(Err(OnemeError::BodyTooLarge { .. }))
        ));
        session.closed().await;
    }

    #[tokio::test]
    async fn test_handler_receives_frames_and_errors() {
        let (client, mut server) = duplex(4096);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        struct Recorder {
            seen: Arc<Mutex<Vec<u16>>>,
            errors: Arc<Mutex<Vec<String>>>,
        }
        impl FrameHandler for Recorder {
            fn on_frame(&self, frame: Frame) {
                self.seen.lock().unwrap().push(frame.opcode);
            }
            fn on_error(&self, error: &OnemeError) {
                self.errors.lock().unwrap().push(error.to_string());
            }
        }

        let mut session = Session::builder()
            .handler(Recorder {
                seen: seen.clone(),
                errors: errors.clone(),
            })
            .open(client);

        let mut bytes = wire(1, 0, b"a");
        bytes.extend(wire(2, 1, b"b"));
        server.write_all(&bytes).await.unwrap();
        drop(server);

        session.closed().await;
        assert!(session.recv().await.is_none());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(*errors.lock().unwrap(), vec!["Connection closed".to_string()]);
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let (client, mut server) = duplex(4096);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _session = Session::builder()
            .handler(move |frame: Frame| {
                let _ = tx.send(frame.opcode);
            })
            .open(client);

        server.write_all(&wire(42, 0, b"")).await.unwrap();
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, mut server) = open_session();

        session.close();
        session.close();
        session.closed().await;
        assert_eq!(session.state(), SessionState::Closed);

        // Both halves released: the peer sees end-of-stream.
        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);

        assert!(matches!(
            session.send(Frame::new(1, Bytes::new())).await,
            Err(OnemeError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Session::builder()
            .host("127.0.0.1")
            .port(port)
            .connect_timeout(Duration::from_secs(2))
            .connect()
            .await;
        assert!(matches!(result, Err(OnemeError::ConnectFailed { .. })));
    }
}
