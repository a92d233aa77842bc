use bytes::Bytes;
use huddle_relay::{ConnectionHandle, RelayError, RoomId};
use rand::Rng;
use std::time::Instant;

/// Generate a payload of exactly `size` bytes.
///
/// Binary payloads are random (media frames); text payloads are a
/// sequence tag padded with ASCII so they stay valid UTF-8.
pub fn generate_payload(size: usize, seq: u32, binary: bool) -> Bytes {
    if binary {
        let mut buf = vec![0u8; size];
        rand::rng().fill(&mut buf[..]);
        return Bytes::from(buf);
    }
    let mut text = format!("seq={seq};");
    if text.len() < size {
        text.push_str(&"x".repeat(size - text.len()));
    } else {
        text.truncate(size);
    }
    Bytes::from(text)
}

/// Room names used by a scenario: `stress_0`, `stress_1`, ...
pub fn room_names(count: usize) -> Result<Vec<RoomId>, RelayError> {
    (0..count).map(|i| RoomId::parse(format!("stress_{i}"))).collect()
}

/// Whether `err` only says that the relay already closed `conn` (slow
/// member policy or eviction). That ends the simulated connection, not the
/// run.
pub fn closed_by_relay(err: &RelayError, conn: &ConnectionHandle) -> bool {
    matches!(err, RelayError::InvalidHandle { .. }) && !conn.is_open()
}

/// Elapsed seconds since `start`.
pub fn elapsed_s(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

pub fn per_sec(count: u64, elapsed_ms: f64) -> f64 {
    if elapsed_ms <= 0.0 {
        0.0
    } else {
        count as f64 / (elapsed_ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_has_requested_size() {
        assert_eq!(generate_payload(64, 1, true).len(), 64);
        assert_eq!(generate_payload(64, 1, false).len(), 64);
        assert_eq!(generate_payload(3, 12345, false).len(), 3);
    }

    #[test]
    fn text_payload_is_utf8() {
        let payload = generate_payload(32, 7, false);
        let text = std::str::from_utf8(&payload).unwrap();
        assert!(text.starts_with("seq=7;"));
    }

    #[test]
    fn room_names_are_distinct() {
        let rooms = room_names(3).unwrap();
        assert_eq!(rooms.len(), 3);
        assert_eq!(rooms[2].as_str(), "stress_2");
    }

    #[test]
    fn rejection_of_closed_handle_ends_the_connection() {
        let relay = huddle_relay::Relay::default();
        let room = RoomId::from("stress_0");
        let (conn, _rx) = relay.connect();
        let (outsider, _rx_o) = relay.connect();
        relay.on_join(&room, &conn).unwrap();

        // Open but not a member: a real error.
        let err = relay
            .on_message(&room, &outsider, Bytes::from_static(b"x"), false)
            .unwrap_err();
        assert!(!closed_by_relay(&err, &outsider));

        conn.close();
        let err = relay.on_join(&room, &conn).unwrap_err();
        assert!(closed_by_relay(&err, &conn));
    }

    #[test]
    fn rate_handles_zero_elapsed() {
        assert_eq!(per_sec(10, 0.0), 0.0);
        assert_eq!(per_sec(10, 500.0), 20.0);
    }
}
