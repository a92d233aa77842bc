mod churn;
mod common;
mod events;
mod fanout;

use clap::{Parser, Subcommand};
use huddle_relay::{Relay, RelayConfig, SlowMemberPolicy};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "huddle-stress", about = "In-process load test for the huddle relay core")]
struct Cli {
    /// Display name for this run.
    #[arg(short, long, default_value = "Run")]
    name: String,

    /// Per-connection outbound queue depth (frames).
    #[arg(long)]
    buffer: Option<usize>,

    /// What to do with a member whose queue is full: drop or disconnect.
    #[arg(long, default_value = "drop")]
    policy: SlowMemberPolicy,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill rooms with members and broadcast from one member per room.
    Fanout {
        /// Number of rooms.
        #[arg(long, default_value = "4")]
        rooms: usize,
        /// Members per room (the first one sends).
        #[arg(long, default_value = "16")]
        members: usize,
        /// Messages sent per room.
        #[arg(long, default_value = "100")]
        messages: u32,
        /// Payload size in bytes.
        #[arg(long, default_value = "1024")]
        payload_size: usize,
        /// Send binary media frames instead of chat text.
        #[arg(long)]
        binary: bool,
    },

    /// Random concurrent join/leave/send traffic, then verify cleanup.
    Churn {
        /// Number of rooms to spread traffic over.
        #[arg(long, default_value = "8")]
        rooms: usize,
        /// Concurrent simulated connections.
        #[arg(long, default_value = "64")]
        connections: usize,
        /// Operations per connection.
        #[arg(long, default_value = "500")]
        rounds: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    let mut config = RelayConfig::new().slow_member_policy(cli.policy);
    if let Some(buffer) = cli.buffer {
        config = config.outbound_buffer(buffer);
    }
    let relay = Arc::new(Relay::new(config));

    eprintln!("huddle-stress v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();

    match cli.command {
        Command::Fanout {
            rooms,
            members,
            messages,
            payload_size,
            binary,
        } => {
            fanout::run(
                relay,
                fanout::FanoutConfig {
                    rooms,
                    members,
                    messages,
                    payload_size,
                    binary,
                    name: cli.name,
                },
                start,
            )
            .await?;
        }

        Command::Churn {
            rooms,
            connections,
            rounds,
        } => {
            churn::run(
                relay,
                churn::ChurnConfig {
                    rooms,
                    connections,
                    rounds,
                    name: cli.name,
                },
                start,
            )
            .await?;
        }
    }

    Ok(())
}
