use huddle_relay::RelayStats;
use serde::Serialize;
use std::io::Write;

/// Emit a JSONL event to stdout (flushed immediately for piped output).
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

/// Local wall-clock timestamp for JSONL events.
pub fn now_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

// ── Session events ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub name: String,
    pub mode: String,
    pub policy: String,
    pub outbound_buffer: usize,
    pub timestamp: String,
}

impl EventStarted {
    pub fn new(name: &str, mode: &str, policy: &str, outbound_buffer: usize) -> Self {
        Self {
            event: "started",
            name: name.to_string(),
            mode: mode.to_string(),
            policy: policy.to_string(),
            outbound_buffer,
            timestamp: now_iso(),
        }
    }
}

// ── Fanout result ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventFanoutResult {
    pub event: &'static str,
    pub rooms: usize,
    pub members_per_room: usize,
    pub messages_per_room: u32,
    pub binary: bool,
    pub payload_size: usize,
    /// Frames the routing rules called for.
    pub expected_frames: u64,
    /// Frames the writer tasks actually drained.
    pub received_frames: u64,
    /// Most frames sitting in outbound queues at once.
    pub peak_backlog: u64,
    pub dropped: u64,
    pub closed: u64,
    /// Senders the relay closed before they finished their messages.
    pub senders_closed: usize,
    pub elapsed_ms: f64,
    pub frames_per_sec: f64,
    pub elapsed_s: f64,
    pub stats: RelayStats,
}

// ── Churn result ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventChurnResult {
    pub event: &'static str,
    pub rooms: usize,
    pub connections: usize,
    pub rounds: u32,
    pub operations: u64,
    /// Connections the relay closed before they finished their rounds.
    pub closed_early: usize,
    /// Rooms still registered after every connection disconnected.
    pub leaked_rooms: usize,
    /// Connections still indexed after every connection disconnected.
    pub leaked_connections: usize,
    pub elapsed_ms: f64,
    pub ops_per_sec: f64,
    pub elapsed_s: f64,
    pub stats: RelayStats,
}
