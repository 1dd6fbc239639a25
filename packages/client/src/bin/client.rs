//! Terminal checkers client.
//!
//! Creates or joins a game, subscribes to its event stream and plays moves
//! typed at the prompt. Moves made while the stream is down are queued in a
//! local file and replayed in order once it reconnects.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin checkers-client -- --user-id alice --create
//! cargo run --bin checkers-client -- -u bob --game-id <GAME_ID>
//! ```

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use uuid::Uuid;

use checkers_client::{
    runner::{ClientOptions, GameSelection, run_client},
    transport::{BackoffConfig, ReconnectStrategy},
};
use checkers_shared::logger::setup_logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Exponential backoff with jitter, up to 10 attempts
    Backoff,
    /// Fixed 3 second interval without a cap
    Native,
}

#[derive(Parser, Debug)]
#[command(name = "checkers-client")]
#[command(about = "Real-time checkers client with offline move queue", long_about = None)]
struct Args {
    /// User id sent with every request
    #[arg(short = 'u', long)]
    user_id: String,

    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Game to join or resume
    #[arg(short = 'g', long, conflicts_with = "create")]
    game_id: Option<Uuid>,

    /// Create a new game and play red
    #[arg(long)]
    create: bool,

    /// Tab id; defaults to a fresh one per process
    #[arg(long)]
    tab_id: Option<String>,

    /// Reconnect strategy of the event streams
    #[arg(long, value_enum, default_value_t = Strategy::Backoff)]
    strategy: Strategy,

    /// File holding moves that could not be delivered yet
    #[arg(long, default_value = "checkers-queue.json")]
    queue_file: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let game = match (args.create, args.game_id) {
        (true, _) => GameSelection::Create,
        (false, Some(game_id)) => GameSelection::Join(game_id),
        (false, None) => {
            tracing::error!("Either --game-id or --create is required");
            std::process::exit(2);
        }
    };
    let strategy = match args.strategy {
        Strategy::Backoff => ReconnectStrategy::Backoff(BackoffConfig::default()),
        Strategy::Native => ReconnectStrategy::Native {
            retry_interval: Duration::from_secs(3),
        },
    };

    let options = ClientOptions {
        base_url: args.url,
        user_id: args.user_id,
        game,
        tab_id: args
            .tab_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        strategy,
        queue_file: args.queue_file,
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
