//! FanoutEngine: delivers one message to a snapshot of room members.
//!
//! Works on a snapshot, never on the registry, so no lock is held while
//! sending. Every send is non-blocking; a dead or saturated member costs
//! one failed `try_send` and the pass moves on.
use huddle_metrics::Counter;
use serde::Serialize;

use crate::connection::ConnectionHandle;
use crate::error::SendError;
use crate::message::Message;
use crate::types::ConnectionId;

/// What to do with a member whose outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlowMemberPolicy {
    /// The member misses this message and stays connected.
    #[default]
    Drop,
    /// The member is closed and reported as a dead connection.
    Disconnect,
}

impl std::str::FromStr for SlowMemberPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(SlowMemberPolicy::Drop),
            "disconnect" => Ok(SlowMemberPolicy::Disconnect),
            other => Err(format!("unknown slow member policy: {other}")),
        }
    }
}

/// Per-pass delivery summary. The sender never sees it; the coordinator
/// uses `closed` to evict dead members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Members skipped by the routing rule (the sender, for media).
    pub skipped: usize,
    /// Members that missed this message because their queue was full.
    pub dropped: usize,
    /// Members found closed (or closed by the slow member policy).
    pub closed: Vec<ConnectionId>,
}

impl DeliveryReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.dropped + self.closed.len()
    }
}

/// Cumulative engine counters.
#[derive(Debug, Default, Serialize)]
pub struct FanoutStats {
    pub messages: Counter,
    pub deliveries: Counter,
    pub skipped: Counter,
    pub dropped: Counter,
    pub closed: Counter,
}

/// Applies routing rules and backpressure policy to a member snapshot.
#[derive(Debug, Default)]
pub struct FanoutEngine {
    policy: SlowMemberPolicy,
    stats: FanoutStats,
}

impl FanoutEngine {
    pub fn new(policy: SlowMemberPolicy) -> Self {
        Self {
            policy,
            stats: FanoutStats::default(),
        }
    }

    pub fn policy(&self) -> SlowMemberPolicy {
        self.policy
    }

    pub fn stats(&self) -> &FanoutStats {
        &self.stats
    }

    /// Deliver `message` to every member its routing rule admits.
    ///
    /// A failure on one member never stops delivery to the others.
    pub fn deliver(&self, members: &[ConnectionHandle], message: &Message) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let frame = message.frame();

        for member in members {
            if !message.is_recipient(member.id()) {
                report.skipped += 1;
                continue;
            }

            match member.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(SendError::Closed) => {
                    tracing::debug!("fanout: {} is closed, skipping", member.id());
                    report.closed.push(member.id().clone());
                }
                Err(SendError::Full) => match self.policy {
                    SlowMemberPolicy::Drop => {
                        tracing::debug!("fanout: {} queue full, dropped {}", member.id(), message.kind());
                        report.dropped += 1;
                    }
                    SlowMemberPolicy::Disconnect => {
                        tracing::warn!("fanout: {} queue full, disconnecting slow member", member.id());
                        member.close();
                        report.closed.push(member.id().clone());
                    }
                },
            }
        }

        self.stats.messages.inc();
        self.stats.deliveries.inc_by(report.delivered as u64);
        self.stats.skipped.inc_by(report.skipped as u64);
        self.stats.dropped.inc_by(report.dropped as u64);
        self.stats.closed.inc_by(report.closed.len() as u64);
        report
    }
}
