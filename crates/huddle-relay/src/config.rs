use crate::fanout::SlowMemberPolicy;

/// Default per-connection outbound queue depth, in frames.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Configuration for a [`Relay`](crate::Relay).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use huddle_relay::{RelayConfig, SlowMemberPolicy};
///
/// let config = RelayConfig::new()
///     .outbound_buffer(64)
///     .slow_member_policy(SlowMemberPolicy::Disconnect);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Queue depth for handles created through [`Relay::connect`](crate::Relay::connect).
    pub(crate) outbound_buffer: usize,
    /// Reaction to a member whose queue is full.
    pub(crate) slow_member_policy: SlowMemberPolicy,
    /// Drop closed members from a room as soon as a fan-out finds them.
    pub(crate) evict_closed_members: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayConfig {
    /// Create a new config with defaults.
    ///
    /// If the `HUDDLE_OUTBOUND_BUFFER` environment variable holds a positive
    /// integer, it is used as the outbound queue depth. This can be
    /// overridden with [`.outbound_buffer()`](RelayConfig::outbound_buffer).
    pub fn new() -> Self {
        let outbound_buffer = std::env::var("HUDDLE_OUTBOUND_BUFFER")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_OUTBOUND_BUFFER);

        Self {
            outbound_buffer,
            slow_member_policy: SlowMemberPolicy::default(),
            evict_closed_members: true,
        }
    }

    /// Set the per-connection queue depth (minimum 1).
    pub fn outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames.max(1);
        self
    }

    pub fn slow_member_policy(mut self, policy: SlowMemberPolicy) -> Self {
        self.slow_member_policy = policy;
        self
    }

    /// Keep or evict closed members discovered during fan-out (default: evict).
    ///
    /// With eviction off, dead members stay listed until the transport
    /// reports the disconnect.
    pub fn evict_closed_members(mut self, enabled: bool) -> Self {
        self.evict_closed_members = enabled;
        self
    }

    pub fn get_outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    pub fn get_slow_member_policy(&self) -> SlowMemberPolicy {
        self.slow_member_policy
    }
}
