use crate::common::{closed_by_relay, elapsed_s, generate_payload, per_sec, room_names};
use crate::events::*;
use huddle_metrics::{Counter, Gauge};
use huddle_relay::{ConnectionHandle, Relay};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct FanoutConfig {
    pub rooms: usize,
    pub members: usize,
    pub messages: u32,
    pub payload_size: usize,
    pub binary: bool,
    pub name: String,
}

/// Fill `rooms` rooms with `members` simulated peers each, let the first
/// member of every room send `messages` frames, and count what the
/// writer tasks drain.
///
/// A sender the relay closes (its own echo queue overflowed under the
/// disconnect policy) stops early and is reported in `senders_closed`.
pub async fn run(
    relay: Arc<Relay>,
    config: FanoutConfig,
    start: Instant,
) -> anyhow::Result<EventFanoutResult> {
    let policy = format!("{:?}", relay.config().get_slow_member_policy());
    emit(&EventStarted::new(
        &config.name,
        "fanout",
        &policy,
        relay.config().get_outbound_buffer(),
    ));
    eprintln!(
        "Fanout mode → {} rooms x {} members, {} msgs per room, {} byte {} payload",
        config.rooms,
        config.members,
        config.messages,
        config.payload_size,
        if config.binary { "media" } else { "chat" }
    );

    let rooms = room_names(config.rooms)?;
    let received = Arc::new(Counter::new());
    // Enqueued minus drained. A writer can drain a frame before the sender
    // books it, so the peak is a lower bound.
    let backlog = Arc::new(Gauge::new());
    let mut writers = Vec::new();
    let mut senders: Vec<(usize, ConnectionHandle)> = Vec::new();
    let mut everyone: Vec<ConnectionHandle> = Vec::new();

    // Setup: every member gets a writer task draining its queue
    for (r, room) in rooms.iter().enumerate() {
        for m in 0..config.members {
            let (conn, mut rx) = relay.connect();
            relay.on_join(room, &conn)?;
            if m == 0 {
                senders.push((r, conn.clone()));
            }
            everyone.push(conn);

            let received = received.clone();
            let backlog = backlog.clone();
            writers.push(tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    received.inc();
                    backlog.dec();
                }
            }));
        }
    }

    // Send phase: one task per room, all rooms concurrently
    let fanout_start = Instant::now();
    let mut tasks = Vec::new();
    for (r, sender) in senders {
        let relay = relay.clone();
        let room = rooms[r].clone();
        let messages = config.messages;
        let payload_size = config.payload_size;
        let binary = config.binary;
        let backlog = backlog.clone();
        tasks.push(tokio::spawn(async move {
            for seq in 1..=messages {
                let payload = generate_payload(payload_size, seq, binary);
                let report = match relay.on_message(&room, &sender, payload, binary) {
                    Ok(report) => report,
                    Err(e) if closed_by_relay(&e, &sender) => return anyhow::Ok(true),
                    Err(e) => return Err(anyhow::Error::from(e)),
                };
                backlog.inc_by(report.delivered as u64);
                if seq % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            anyhow::Ok(false)
        }));
    }
    let mut senders_closed = 0usize;
    for task in tasks {
        if task.await?? {
            senders_closed += 1;
        }
    }

    // Drain phase: wait until writers caught up with what was enqueued (5s
    // cap). Frames queued to a member the relay closed are abandoned, so
    // also stop once the writers go quiet.
    let enqueued = relay.stats().deliveries;
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut last = received.get();
    let mut idle_polls = 0;
    while received.get() < enqueued && Instant::now() < deadline && idle_polls < 20 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let now = received.get();
        if now == last {
            idle_polls += 1;
        } else {
            idle_polls = 0;
            last = now;
        }
    }
    let elapsed_ms = fanout_start.elapsed().as_secs_f64() * 1000.0;

    for conn in &everyone {
        relay.on_disconnect(conn);
    }
    for writer in writers {
        let _ = writer.await;
    }

    let per_message = if config.binary {
        config.members.saturating_sub(1)
    } else {
        config.members
    };
    let expected_frames = (config.rooms * per_message) as u64 * config.messages as u64;
    let received_frames = received.get();
    let stats = relay.stats();

    tracing::debug!("fanout finished: {stats:?}");
    eprintln!(
        "\n  fanout: {received_frames}/{expected_frames} frames received, {} dropped, {} closed, {:.1}ms",
        stats.dropped, stats.closed, elapsed_ms
    );

    let result = EventFanoutResult {
        event: "fanout_result",
        rooms: config.rooms,
        members_per_room: config.members,
        messages_per_room: config.messages,
        binary: config.binary,
        payload_size: config.payload_size,
        expected_frames,
        received_frames,
        peak_backlog: backlog.peak(),
        dropped: stats.dropped,
        closed: stats.closed,
        senders_closed,
        elapsed_ms,
        frames_per_sec: per_sec(received_frames, elapsed_ms),
        elapsed_s: elapsed_s(start),
        stats,
    };
    emit(&result);

    Ok(result)
}
