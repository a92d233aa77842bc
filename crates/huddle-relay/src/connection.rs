//! Connection handles: identity plus outbound delivery for one peer.
//!
//! The relay never owns a connection. It holds clones of the handle as
//! membership entries and pushes frames through [`ConnectionHandle::send`],
//! which never blocks: a full queue or a vanished peer is reported back as
//! a [`SendError`] for the fan-out engine to absorb.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

use crate::error::SendError;
use crate::types::ConnectionId;

// ── Frame ────────────────────────────────────────────────────────────────

/// What a peer actually receives. Clones share the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(Arc<str>),
    Binary(Bytes),
}

impl Frame {
    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Outbound ─────────────────────────────────────────────────────────────

/// Delivery capability required from the transport for each peer.
///
/// In production: a bounded queue drained by the connection's writer task
/// (see [`ConnectionHandle::channel`]).
/// In tests: any recorder or deliberately failing sink.
pub trait Outbound: Send + Sync + 'static {
    /// Hand a frame to the peer without blocking.
    fn send(&self, frame: Frame) -> Result<(), SendError>;
}

struct ChannelOutbound {
    tx: mpsc::Sender<Frame>,
}

impl Outbound for ChannelOutbound {
    fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(SendError::from)
    }
}

// ── Liveness ─────────────────────────────────────────────────────────────

struct Liveness {
    open: AtomicBool,
    closed: Notify,
}

impl Liveness {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            closed: Notify::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Returns true only for the call that actually flipped the flag.
    fn close(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        if was_open {
            self.closed.notify_waiters();
        }
        was_open
    }
}

// ── ConnectionHandle ─────────────────────────────────────────────────────

struct HandleInner {
    id: ConnectionId,
    liveness: Arc<Liveness>,
    outbound: Box<dyn Outbound>,
}

/// Shared handle to one connected peer. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Wrap a custom delivery capability under the given identity.
    pub fn new(id: ConnectionId, outbound: impl Outbound) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                liveness: Arc::new(Liveness::new()),
                outbound: Box::new(outbound),
            }),
        }
    }

    /// Create a handle backed by a bounded queue of `capacity` frames.
    ///
    /// The transport's writer task drains the returned receiver. Dropping
    /// the receiver closes the connection from the relay's point of view.
    pub fn channel(capacity: usize) -> (Self, OutboundReceiver) {
        Self::channel_with_id(ConnectionId::new(), capacity)
    }

    /// Like [`ConnectionHandle::channel`] with a caller-chosen identity.
    pub fn channel_with_id(id: ConnectionId, capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let liveness = Arc::new(Liveness::new());
        let handle = Self {
            inner: Arc::new(HandleInner {
                id,
                liveness: liveness.clone(),
                outbound: Box::new(ChannelOutbound { tx }),
            }),
        };
        (handle, OutboundReceiver { rx, liveness })
    }

    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    pub fn is_open(&self) -> bool {
        self.inner.liveness.is_open()
    }

    /// Mark the peer as gone. Idempotent; returns true on the first call.
    ///
    /// Pending frames are abandoned and the writer's
    /// [`OutboundReceiver::recv`] resolves to `None`.
    pub fn close(&self) -> bool {
        self.inner.liveness.close()
    }

    /// Push one frame to this peer.
    ///
    /// A `Closed` answer from the outbound also clears the liveness flag,
    /// so later sends fail fast.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        match self.inner.outbound.send(frame) {
            Err(SendError::Closed) => {
                self.close();
                Err(SendError::Closed)
            }
            other => other,
        }
    }

    pub fn send_text(&self, text: impl Into<Arc<str>>) -> Result<(), SendError> {
        self.send(Frame::Text(text.into()))
    }

    pub fn send_binary(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        self.send(Frame::Binary(payload.into()))
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("open", &self.is_open())
            .finish()
    }
}

// ── OutboundReceiver ─────────────────────────────────────────────────────

/// Writer-side half of a queue-backed handle.
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Frame>,
    liveness: Arc<Liveness>,
}

impl OutboundReceiver {
    /// Next frame for the peer, or `None` once the handle is closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        let mut closed = std::pin::pin!(self.liveness.closed.notified());
        // Register interest before checking the flag so a close between the
        // check and the select is not missed.
        closed.as_mut().enable();
        if !self.liveness.is_open() {
            return None;
        }
        tokio::select! {
            biased;
            _ = closed => None,
            frame = self.rx.recv() => frame,
        }
    }

    /// Non-blocking variant of [`OutboundReceiver::recv`].
    pub fn try_recv(&mut self) -> Option<Frame> {
        if !self.liveness.is_open() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
