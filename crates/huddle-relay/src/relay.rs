//! Relay: the entry point the transport layer calls into.
//!
//! One call per transport event: a peer joined a room, sent a frame, left a
//! room, or went away. The relay orchestrates the registry and the fan-out
//! engine and owns the cleanup contract: once a connection is reported gone,
//! it is in no room.
use bytes::Bytes;
use huddle_metrics::Counter;
use serde::Serialize;

use crate::config::RelayConfig;
use crate::connection::{ConnectionHandle, OutboundReceiver};
use crate::error::RelayError;
use crate::fanout::{DeliveryReport, FanoutEngine};
use crate::message::Message;
use crate::registry::{JoinOutcome, RoomRegistry};
use crate::types::{ConnectionId, RoomId};

#[derive(Debug, Default)]
struct LifecycleCounters {
    joins: Counter,
    leaves: Counter,
    disconnects: Counter,
    rejected: Counter,
    evicted: Counter,
}

/// Serializable snapshot of relay activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub rooms: u64,
    pub connections: u64,
    pub joins: u64,
    pub leaves: u64,
    /// Connections removed from every room because they went away, either
    /// reported by the transport or found closed during a fan-out.
    pub disconnects: u64,
    /// Joins and sends refused with `InvalidHandle`.
    pub rejected: u64,
    /// Closed members removed by a fan-out pass. Also counted in
    /// `disconnects`.
    pub evicted: u64,
    pub messages: u64,
    pub deliveries: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub closed: u64,
}

/// Room relay: registry plus fan-out behind the transport's event calls.
///
/// Shared across connection tasks behind an `Arc`; every method takes
/// `&self`.
pub struct Relay {
    config: RelayConfig,
    registry: RoomRegistry,
    engine: FanoutEngine,
    counters: LifecycleCounters,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        let engine = FanoutEngine::new(config.slow_member_policy);
        Self {
            config,
            registry: RoomRegistry::new(),
            engine,
            counters: LifecycleCounters::default(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// New queue-backed handle sized by the configured outbound buffer.
    pub fn connect(&self) -> (ConnectionHandle, OutboundReceiver) {
        ConnectionHandle::channel(self.config.outbound_buffer)
    }

    // ── Transport events ─────────────────────────────────────────────────

    /// A peer asked to join `room`. Idempotent.
    pub fn on_join(&self, room: &RoomId, conn: &ConnectionHandle) -> Result<JoinOutcome, RelayError> {
        match self.registry.join(room, conn) {
            Ok(outcome) => {
                if outcome != JoinOutcome::AlreadyMember {
                    self.counters.joins.inc();
                }
                Ok(outcome)
            }
            Err(e) => {
                self.counters.rejected.inc();
                tracing::debug!("join rejected: {e}");
                Err(e)
            }
        }
    }

    /// A peer sent a frame to `room`.
    ///
    /// Binary frames fan out as media (not echoed to the sender), text
    /// frames as chat (echoed). The sender must be open and a member of the
    /// room. An empty frame reaches nobody. Recipients that turn out to be
    /// closed are evicted when eviction is enabled; the sender is never told
    /// about them.
    pub fn on_message(
        &self,
        room: &RoomId,
        conn: &ConnectionHandle,
        payload: Bytes,
        is_binary: bool,
    ) -> Result<DeliveryReport, RelayError> {
        let sender = conn.id();
        if !conn.is_open() {
            self.counters.rejected.inc();
            return Err(RelayError::invalid_handle(sender.clone(), "connection is closed"));
        }
        if !self.registry.is_member(room, sender) {
            self.counters.rejected.inc();
            return Err(RelayError::invalid_handle(
                sender.clone(),
                format!("not a member of room {room}"),
            ));
        }

        if payload.is_empty() {
            tracing::trace!("room {room}: empty frame from {sender} ignored");
            return Ok(DeliveryReport::default());
        }

        let message = Message::from_payload(sender.clone(), payload, is_binary);
        let members = self.registry.members(room);
        let report = self.engine.deliver(&members, &message);

        tracing::trace!(
            "room {room}: {} from {sender} -> {} delivered, {} dropped, {} closed",
            message.kind(),
            report.delivered,
            report.dropped,
            report.closed.len()
        );

        if self.config.evict_closed_members {
            for dead in &report.closed {
                if !self.registry.leave_all(dead).is_empty() {
                    self.counters.evicted.inc();
                    self.counters.disconnects.inc();
                    tracing::debug!("room {room}: evicted closed member {dead}");
                }
            }
        }

        Ok(report)
    }

    /// A peer left one room. No-op if it was not there.
    pub fn on_leave(&self, room: &RoomId, conn: &ConnectionId) -> bool {
        let left = self.registry.leave(room, conn);
        if left {
            self.counters.leaves.inc();
        }
        left
    }

    /// The peer's transport closed. Removes it from every room.
    ///
    /// The handle is closed first so that a join racing this call is either
    /// cleaned up here or rejected. Repeated calls find nothing to do.
    pub fn on_disconnect(&self, conn: &ConnectionHandle) -> Vec<RoomId> {
        conn.close();
        let left = self.registry.leave_all(conn.id());
        if !left.is_empty() {
            self.counters.disconnects.inc();
            tracing::debug!("{} disconnected from {} room(s)", conn.id(), left.len());
        }
        left
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn stats(&self) -> RelayStats {
        let fanout = self.engine.stats();
        RelayStats {
            rooms: self.registry.room_count() as u64,
            connections: self.registry.connection_count() as u64,
            joins: self.counters.joins.get(),
            leaves: self.counters.leaves.get(),
            disconnects: self.counters.disconnects.get(),
            rejected: self.counters.rejected.get(),
            evicted: self.counters.evicted.get(),
            messages: fanout.messages.get(),
            deliveries: fanout.deliveries.get(),
            skipped: fanout.skipped.get(),
            dropped: fanout.dropped.get(),
            closed: fanout.closed.get(),
        }
    }
}
