use crate::common::{closed_by_relay, elapsed_s, generate_payload, per_sec, room_names};
use crate::events::*;
use bytes::Bytes;
use huddle_relay::Relay;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;

pub struct ChurnConfig {
    pub rooms: usize,
    pub connections: usize,
    pub rounds: u32,
    pub name: String,
}

/// Hammer the registry with random join / leave / send traffic from
/// `connections` concurrent tasks, then disconnect everyone and check that
/// nothing is left behind.
///
/// A connection the relay closes (slow member policy, eviction) stops early
/// and is reported in `closed_early`.
pub async fn run(
    relay: Arc<Relay>,
    config: ChurnConfig,
    start: Instant,
) -> anyhow::Result<EventChurnResult> {
    let policy = format!("{:?}", relay.config().get_slow_member_policy());
    emit(&EventStarted::new(
        &config.name,
        "churn",
        &policy,
        relay.config().get_outbound_buffer(),
    ));
    eprintln!(
        "Churn mode → {} connections over {} rooms, {} rounds each",
        config.connections, config.rooms, config.rounds
    );

    let rooms = Arc::new(room_names(config.rooms.max(1))?);
    let churn_start = Instant::now();
    let mut tasks = Vec::new();

    for _ in 0..config.connections {
        let relay = relay.clone();
        let rooms = rooms.clone();
        let rounds = config.rounds;
        tasks.push(tokio::spawn(async move {
            let (conn, mut rx) = relay.connect();
            let mut ops = 0u64;
            let mut closed = false;
            for seq in 1..=rounds {
                if !conn.is_open() {
                    closed = true;
                    break;
                }
                // Pick everything up front: the rng is not Send across awaits.
                let (room_idx, action) = {
                    let mut rng = rand::rng();
                    (rng.random_range(0..rooms.len()), rng.random_range(0..10u8))
                };
                let room = &rooms[room_idx];
                match action {
                    0..=3 => {
                        if let Err(e) = relay.on_join(room, &conn) {
                            if closed_by_relay(&e, &conn) {
                                closed = true;
                                break;
                            }
                            return Err(anyhow::Error::from(e));
                        }
                    }
                    4..=5 => {
                        relay.on_leave(room, conn.id());
                    }
                    _ => {
                        let binary = action % 2 == 0;
                        let payload: Bytes = generate_payload(32, seq, binary);
                        // Not joined to this room right now: rejection is expected.
                        let _ = relay.on_message(room, &conn, payload, binary);
                    }
                }
                ops += 1;

                while rx.try_recv().is_some() {}
                if seq % 32 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            relay.on_disconnect(&conn);
            anyhow::Ok((ops + 1, closed))
        }));
    }

    let mut operations = 0u64;
    let mut closed_early = 0usize;
    for task in tasks {
        let (ops, closed) = task.await??;
        operations += ops;
        if closed {
            closed_early += 1;
        }
    }
    let elapsed_ms = churn_start.elapsed().as_secs_f64() * 1000.0;

    let leaked_rooms = relay.registry().room_count();
    let leaked_connections = relay.registry().connection_count();
    if leaked_rooms > 0 || leaked_connections > 0 {
        tracing::warn!(
            "churn left {leaked_rooms} room(s) and {leaked_connections} connection(s) behind"
        );
    }
    let stats = relay.stats();

    eprintln!(
        "\n  churn: {operations} ops in {elapsed_ms:.1}ms, {closed_early} closed early, leaked rooms={leaked_rooms} connections={leaked_connections}"
    );

    let result = EventChurnResult {
        event: "churn_result",
        rooms: config.rooms,
        connections: config.connections,
        rounds: config.rounds,
        operations,
        closed_early,
        leaked_rooms,
        leaked_connections,
        elapsed_ms,
        ops_per_sec: per_sec(operations, elapsed_ms),
        elapsed_s: elapsed_s(start),
        stats,
    };
    emit(&result);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_relay::{RelayConfig, SlowMemberPolicy};

    #[tokio::test]
    async fn disconnect_policy_with_tiny_buffer_completes_cleanly() {
        let relay = Arc::new(Relay::new(
            RelayConfig::new()
                .slow_member_policy(SlowMemberPolicy::Disconnect)
                .outbound_buffer(1),
        ));
        let config = ChurnConfig {
            rooms: 2,
            connections: 16,
            rounds: 200,
            name: "test".into(),
        };

        let result = run(relay.clone(), config, Instant::now()).await.unwrap();

        assert_eq!(result.leaked_rooms, 0);
        assert_eq!(result.leaked_connections, 0);
        assert_eq!(relay.registry().room_count(), 0);
    }
}
