//! Relays a blocking chunk producer onto an async event stream.
//!
//! The producer runs on the blocking pool and feeds a bounded channel. The
//! consumer polls that channel with a short timeout so it can interleave
//! `: heartbeat` comments while the model is thinking, and it stops the
//! producer (through a shared cancel flag plus the closed channel) as soon as
//! the client goes away.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ask_bridge_error::BridgeError;
use axum::body::Bytes;
use futures::{stream, Stream};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const RELAY_QUEUE_CAPACITY: usize = 100;
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

const PRODUCER_STOPPED: &str = "stream producer stopped unexpectedly";
const DEADLINE_EXCEEDED: &str = "stream deadline exceeded";

pub type ChunkIter = Box<dyn Iterator<Item = Result<String, BridgeError>> + Send>;

/// A blocking source of text chunks, e.g. a streaming model call.
///
/// `stream` is called on a blocking thread. Iteration may block between
/// chunks; the bridge never drives it from an async task.
pub trait ChunkSource: Send + Sync {
    fn stream(&self, input: &str) -> Result<ChunkIter, BridgeError>;
}

/// What the producer pushes into the relay queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    Error(String),
    End,
}

/// One server-sent event frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Heartbeat,
    Data(String),
    Done,
    Error(String),
}

impl Frame {
    pub fn encode(&self) -> String {
        match self {
            Self::Heartbeat => ": heartbeat\n\n".to_string(),
            Self::Data(text) => format!("data: {text}\n\n"),
            Self::Done => "data: [DONE]\n\n".to_string(),
            Self::Error(message) => format!("data: [STREAM ERROR] {message}\n\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Producing,
    Draining,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Upper bound on a whole stream; `None` streams for as long as the
    /// producer keeps going.
    pub deadline: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: RELAY_QUEUE_CAPACITY,
            poll_interval: POLL_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            deadline: None,
        }
    }
}

/// One streaming request: a producer on the blocking pool, the relay queue,
/// and the consumer side that turns queue items into frames.
#[derive(Debug)]
pub struct StreamSession {
    rx: mpsc::Receiver<StreamChunk>,
    tx: Option<mpsc::Sender<StreamChunk>>,
    cancelled: Arc<AtomicBool>,
    config: BridgeConfig,
    state: SessionState,
    started_at: Instant,
    last_emit: Instant,
}

impl StreamSession {
    pub fn new(config: BridgeConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let now = Instant::now();
        Self {
            rx,
            tx: Some(tx),
            cancelled: Arc::new(AtomicBool::new(false)),
            config,
            state: SessionState::Idle,
            started_at: now,
            last_emit: now,
        }
    }

    /// Creates a session and starts its producer right away.
    pub fn spawn(source: Arc<dyn ChunkSource>, input: String, config: BridgeConfig) -> Self {
        let mut session = Self::new(config);
        session.start(source, input);
        session
    }

    /// Starts the producer. Must be called from within a tokio runtime.
    /// Calling it twice is a no-op.
    pub fn start(&mut self, source: Arc<dyn ChunkSource>, input: String) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let cancelled = self.cancelled.clone();
        let now = Instant::now();
        self.started_at = now;
        self.last_emit = now;
        self.state = SessionState::Producing;

        tracing::debug!(input_len = input.len(), "stream session started");
        tokio::task::spawn_blocking(move || produce(source.as_ref(), &input, &tx, &cancelled));
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Next frame for the client, or `None` once the stream is over.
    ///
    /// A heartbeat is only produced after a poll found the queue empty and
    /// nothing was emitted for a full heartbeat interval, so it never splits
    /// chunks that arrive back-to-back.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                SessionState::Producing => {}
                SessionState::Draining | SessionState::Failed => {
                    self.close();
                    return None;
                }
                SessionState::Idle | SessionState::Closed => return None,
            }

            if let Some(deadline) = self.config.deadline {
                if self.started_at.elapsed() >= deadline {
                    tracing::warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        "stream deadline exceeded"
                    );
                    self.fail();
                    return Some(Frame::Error(DEADLINE_EXCEEDED.to_string()));
                }
            }

            match tokio::time::timeout(self.config.poll_interval, self.rx.recv()).await {
                Err(_) => {
                    if self.last_emit.elapsed() >= self.config.heartbeat_interval {
                        self.last_emit = Instant::now();
                        return Some(Frame::Heartbeat);
                    }
                }
                Ok(Some(StreamChunk::Text(text))) => {
                    self.last_emit = Instant::now();
                    return Some(Frame::Data(text.replace('\r', "")));
                }
                Ok(Some(StreamChunk::Error(message))) => {
                    tracing::warn!(error = %message, "stream producer failed");
                    self.fail();
                    return Some(Frame::Error(collapse_newlines(&message)));
                }
                Ok(Some(StreamChunk::End)) => {
                    self.state = SessionState::Draining;
                    return Some(Frame::Done);
                }
                Ok(None) => {
                    tracing::error!("stream producer dropped the queue without finishing");
                    self.fail();
                    return Some(Frame::Error(PRODUCER_STOPPED.to_string()));
                }
            }
        }
    }

    /// Encoded frames as a response body stream. Dropping the stream cancels
    /// the producer.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        stream::unfold(self, |mut session| async move {
            let frame = session.next_frame().await?;
            Some((Ok(Bytes::from(frame.encode())), session))
        })
    }

    fn fail(&mut self) {
        self.state = SessionState::Failed;
        self.cancelled.store(true, Ordering::Release);
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
        self.cancelled.store(true, Ordering::Release);
        self.rx.close();
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if self.state == SessionState::Producing {
            tracing::info!("client disconnected, cancelling stream producer");
        }
    }
}

fn produce(
    source: &dyn ChunkSource,
    input: &str,
    tx: &mpsc::Sender<StreamChunk>,
    cancelled: &AtomicBool,
) {
    let chunks = match source.stream(input) {
        Ok(chunks) => chunks,
        Err(err) => {
            let _ = tx.blocking_send(StreamChunk::Error(err.to_string()));
            return;
        }
    };

    let mut sent = 0usize;
    for item in chunks {
        if cancelled.load(Ordering::Acquire) {
            tracing::debug!(sent, "stream producer cancelled");
            return;
        }
        let chunk = match item {
            Ok(text) => StreamChunk::Text(text),
            Err(err) => {
                let _ = tx.blocking_send(StreamChunk::Error(err.to_string()));
                return;
            }
        };
        if tx.blocking_send(chunk).is_err() {
            tracing::debug!(sent, "stream consumer gone");
            return;
        }
        sent += 1;
    }

    tracing::debug!(sent, "stream producer finished");
    let _ = tx.blocking_send(StreamChunk::End);
}

fn collapse_newlines(message: &str) -> String {
    message.replace(|c: char| c == '\n' || c == '\r', " ")
}
