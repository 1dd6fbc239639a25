//! Checkers game server.
//!
//! Serves the HTTP API and the server-sent event streams for game and user
//! channels.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin checkers-server
//! cargo run --bin checkers-server -- --host 0.0.0.0 --port 3000
//! ```

use std::time::Duration;

use checkers_server::{app::build_server, config::HubConfig};
use checkers_shared::logger::setup_logger;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "checkers-server")]
#[command(about = "Checkers game server with server-sent event push", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Seconds between heartbeats sent to every connection
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_secs: u64,

    /// Seconds without activity before a connection is swept
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    stale_secs: u64,

    /// Seconds between stale connection sweeps
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    sweep_secs: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let config = HubConfig {
        heartbeat_interval: Duration::from_secs(args.heartbeat_secs),
        stale_timeout: Duration::from_secs(args.stale_secs),
        sweep_interval: Duration::from_secs(args.sweep_secs),
        ..HubConfig::default()
    };

    let server = build_server(config);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_intervals_are_rejected() {
        // テスト項目: 0 秒の間隔は起動時の引数チェックで弾かれる
        // given (前提条件):
        let zero_heartbeat = ["checkers-server", "--heartbeat-secs", "0"];
        let zero_sweep = ["checkers-server", "--sweep-secs", "0"];
        let zero_stale = ["checkers-server", "--stale-secs", "0"];

        // when (操作):
        let results = [
            Args::try_parse_from(zero_heartbeat),
            Args::try_parse_from(zero_sweep),
            Args::try_parse_from(zero_stale),
        ];

        // then (期待する結果):
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[test]
    fn test_default_intervals_parse() {
        // テスト項目: 引数なしなら既定の間隔で起動できる
        // given (前提条件):
        let argv = ["checkers-server"];

        // when (操作):
        let args = Args::try_parse_from(argv).unwrap();

        // then (期待する結果):
        assert_eq!(args.heartbeat_secs, 15);
        assert_eq!(args.stale_secs, 60);
        assert_eq!(args.sweep_secs, 30);
    }
}
