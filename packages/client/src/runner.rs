//! Interactive game session.
//!
//! Two event streams are opened per session: the game channel (moves, chat,
//! draw offers) and the user channel (notifications). Input is read with
//! rustyline on a separate thread and forwarded over a channel.

use std::{io::Write, path::PathBuf, sync::Arc};

use checkers_shared::{
    game::Move,
    protocol::{
        Envelope, EventType,
        api::{DrawAction, GameSnapshot, GameStatus},
        events::{
            ChatMessagePayload, DrawRequestPayload, DrawResponsePayload, GameMovePayload,
            GameOverPayload, NotificationPayload, PlayerJoinedPayload, PresencePayload,
        },
    },
    time::{Clock, SystemClock},
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    api::{HttpMoveApi, MoveApi},
    error::ApiError,
    formatter::GameFormatter,
    optimistic::{OptimisticEvent, OptimisticUpdateManager},
    queue_store::FileQueueStore,
    sync::{GameSync, SubmitOutcome, SyncConfig},
    transport::{
        HttpEventSource, LifecycleEvent, ReconnectStrategy, TransportClient, TransportConfig,
        TransportEvent, game_stream_url, user_stream_url,
    },
};

/// Which game the session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameSelection {
    Create,
    Join(Uuid),
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server base URL, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    pub user_id: String,
    pub game: GameSelection,
    /// Per-tab id; a second session with the same id replaces this one.
    pub tab_id: String,
    pub strategy: ReconnectStrategy,
    pub queue_file: PathBuf,
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Move),
    Chat(String),
    Draw(DrawAction),
    Resign,
    Board,
    Status,
    Replay,
    Reconnect,
    Pause,
    Resume,
    Help,
    Quit,
}

/// Parse one input line. Anything not starting with `/` is a move.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return line
            .parse::<Move>()
            .map(Command::Move)
            .map_err(|e| format!("{} (type /help for commands)", e));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "chat" if !arg.is_empty() => Ok(Command::Chat(arg.to_string())),
        "chat" => Err("Usage: /chat <text>".to_string()),
        "draw" => match arg {
            "offer" => Ok(Command::Draw(DrawAction::Offer)),
            "accept" => Ok(Command::Draw(DrawAction::Accept)),
            "decline" => Ok(Command::Draw(DrawAction::Decline)),
            _ => Err("Usage: /draw offer|accept|decline".to_string()),
        },
        "resign" => Ok(Command::Resign),
        "board" => Ok(Command::Board),
        "status" => Ok(Command::Status),
        "replay" => Ok(Command::Replay),
        "reconnect" => Ok(Command::Reconnect),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        _ => Err(format!("Unknown command '/{}' (type /help)", name)),
    }
}

/// Redisplay the prompt after printing asynchronous output
fn redisplay_prompt(user_id: &str) {
    print!("{}> ", user_id);
    std::io::stdout().flush().ok();
}

/// Create the game, or join it when the user has no seat yet.
async fn open_game(
    api: &HttpMoveApi,
    user_id: &str,
    selection: GameSelection,
) -> Result<GameSnapshot, ApiError> {
    match selection {
        GameSelection::Create => {
            let game = api.create_game().await?;
            tracing::info!("Created game {}", game.game_id);
            Ok(game)
        }
        GameSelection::Join(game_id) => {
            let game = api.fetch_game(game_id).await?;
            let seated = game.red_player.as_deref() == Some(user_id)
                || game.black_player.as_deref() == Some(user_id);
            if seated || game.status != GameStatus::Waiting {
                return Ok(game);
            }
            let game = api.join_game(game_id).await?;
            tracing::info!("Joined game {}", game_id);
            Ok(game)
        }
    }
}

struct Session {
    user_id: String,
    game_id: Uuid,
    api: Arc<HttpMoveApi>,
    sync: GameSync,
    game_transport: TransportClient,
    user_transport: TransportClient,
}

impl Session {
    fn print_board(&self) {
        if let Some(game) = self.sync.view() {
            print!("{}", GameFormatter::format_board(&game, &self.user_id));
            if let Some(hint) = GameFormatter::format_turn_hint(&game, &self.user_id) {
                print!("{}", hint);
            }
        }
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::Move(mv) => match self.sync.submit_move(mv).await {
                Ok(outcome) => {
                    print!("{}", GameFormatter::format_submit_outcome(mv, &outcome));
                    if outcome != SubmitOutcome::Duplicate {
                        self.print_board();
                    }
                }
                Err(e) => println!("Error: {}", e),
            },
            Command::Chat(content) => {
                if let Err(e) = self.api.send_chat(self.game_id, content).await {
                    println!("Error: {}", e);
                }
            }
            Command::Draw(action) => {
                if let Err(e) = self.api.respond_draw(self.game_id, action).await {
                    println!("Error: {}", e);
                }
            }
            Command::Resign => {
                if let Err(e) = self.api.resign(self.game_id).await {
                    println!("Error: {}", e);
                }
            }
            Command::Board => {
                let conflicted = self.sync.state().optimistic.conflict.is_some();
                if (conflicted || self.sync.view().is_none())
                    && let Err(e) = self.sync.resync().await
                {
                    println!("Error: {}", e);
                }
                self.print_board();
            }
            Command::Status => {
                print!(
                    "{}",
                    GameFormatter::format_sync_status(
                        &self.sync.state(),
                        self.sync.optimistic().pending_count()
                    )
                );
                println!(
                    "game stream: {}, user stream: {}",
                    self.game_transport.state(),
                    self.user_transport.state()
                );
            }
            Command::Replay => {
                let report = self.sync.replay_queue().await;
                print!("{}", GameFormatter::format_replay_report(&report));
            }
            Command::Reconnect => {
                self.game_transport.reconnect();
                self.user_transport.reconnect();
            }
            Command::Pause => {
                self.game_transport.handle_lifecycle(LifecycleEvent::Hidden);
                self.user_transport.handle_lifecycle(LifecycleEvent::Hidden);
            }
            Command::Resume => {
                self.game_transport.handle_lifecycle(LifecycleEvent::Visible);
                self.user_transport.handle_lifecycle(LifecycleEvent::Visible);
            }
            Command::Help => print!("{}", GameFormatter::format_help()),
            Command::Quit => {}
        }
    }

    async fn on_game_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => {
                print!(
                    "{}",
                    GameFormatter::format_connection_state(
                        state,
                        self.game_transport.reconnect_attempts()
                    )
                );
                match self.sync.on_transport_state(state).await {
                    Ok(Some(report)) => {
                        if report.replayed > 0 || report.failed.is_some() {
                            print!("{}", GameFormatter::format_replay_report(&report));
                        }
                        self.print_board();
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Sync after {} failed: {}", state, e),
                }
            }
            TransportEvent::Message(envelope) => {
                self.sync.handle_envelope(&envelope).await;
                self.show_game_envelope(&envelope);
            }
        }
    }

    fn show_game_envelope(&self, envelope: &Envelope) {
        match envelope.r#type {
            EventType::GameMove => {
                if let Ok(event) = envelope.payload_as::<GameMovePayload>()
                    && event.moved_by != self.user_id
                {
                    print!("{}", GameFormatter::format_move(&event, envelope.timestamp));
                    self.print_board();
                }
            }
            EventType::MessageSent => {
                if let Ok(message) = envelope.payload_as::<ChatMessagePayload>() {
                    print!("{}", GameFormatter::format_chat_message(&message));
                }
            }
            EventType::PlayerJoined => {
                if let Ok(joined) = envelope.payload_as::<PlayerJoinedPayload>() {
                    print!("{}", GameFormatter::format_player_joined(&joined));
                }
            }
            EventType::PresenceUpdate => {
                if let Ok(presence) = envelope.payload_as::<PresencePayload>()
                    && presence.user_id != self.user_id
                {
                    print!("{}", GameFormatter::format_presence(&presence));
                }
            }
            EventType::DrawRequest => {
                if let Ok(request) = envelope.payload_as::<DrawRequestPayload>()
                    && request.from_user != self.user_id
                {
                    print!("{}", GameFormatter::format_draw_request(&request));
                }
            }
            EventType::DrawResponse => {
                if let Ok(response) = envelope.payload_as::<DrawResponsePayload>() {
                    print!("{}", GameFormatter::format_draw_response(&response));
                }
            }
            EventType::GameOver => {
                if let Ok(over) = envelope.payload_as::<GameOverPayload>() {
                    print!("{}", GameFormatter::format_game_over(&over));
                }
            }
            EventType::ServerShutdown => println!("\n(server is shutting down)"),
            _ => return,
        }
        redisplay_prompt(&self.user_id);
    }

    fn on_user_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => {
                tracing::debug!("User stream is {}", state);
            }
            TransportEvent::Message(envelope) => {
                if envelope.r#type == EventType::NotificationCreated
                    && let Ok(notification) = envelope.payload_as::<NotificationPayload>()
                {
                    print!("{}", GameFormatter::format_notification(&notification));
                    redisplay_prompt(&self.user_id);
                }
            }
        }
    }
}

/// Run an interactive session until `/quit`, Ctrl+C or Ctrl+D.
pub async fn run_client(options: ClientOptions) -> Result<(), Box<dyn std::error::Error>> {
    let http = reqwest::Client::new();
    let api = Arc::new(HttpMoveApi::new(
        http.clone(),
        &options.base_url,
        &options.user_id,
    ));

    let game = open_game(&api, &options.user_id, options.game).await?;
    let game_id = game.game_id;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let optimistic = Arc::new(OptimisticUpdateManager::new(clock.clone()));
    let _rollbacks = optimistic.subscribe(|event| match event {
        OptimisticEvent::RolledBack(update) => println!("\n{} was undone", update.mv),
        OptimisticEvent::Cleared(updates) => {
            println!("\n{} local move(s) replaced by the server state", updates.len())
        }
        _ => {}
    });

    let store = Arc::new(FileQueueStore::new(options.queue_file.clone()));
    let sync = GameSync::new(
        game_id,
        api.clone(),
        store,
        optimistic,
        clock,
        SyncConfig::default(),
    );
    let restored = sync.restore_queue().await?;
    if restored > 0 {
        println!("{} queued move(s) restored; they will be sent once connected", restored);
    }

    let source = Arc::new(HttpEventSource::new(http, options.user_id.clone()));
    let mut game_config =
        TransportConfig::new(game_stream_url(&options.base_url, game_id, &options.tab_id));
    game_config.strategy = options.strategy;
    let mut user_config = TransportConfig::new(user_stream_url(
        &options.base_url,
        &options.user_id,
        &options.tab_id,
    ));
    user_config.strategy = options.strategy;
    let (game_transport, mut game_events) = TransportClient::new(game_config, source.clone());
    let (user_transport, mut user_events) = TransportClient::new(user_config, source);

    let session = Session {
        user_id: options.user_id.clone(),
        game_id,
        api,
        sync,
        game_transport,
        user_transport,
    };

    println!(
        "\nYou are '{}' in game {}. Type a move like c3-d4, or /help. Press Ctrl+C to exit.",
        session.user_id, game_id
    );
    print!("{}", GameFormatter::format_board(&game, &session.user_id));

    session.game_transport.connect();
    session.user_transport.connect();

    // Create channel for rustyline input
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let prompt = format!("{}> ", options.user_id);

    // Spawn a blocking thread for rustyline (synchronous readline)
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            Some(event) = game_events.recv() => session.on_game_event(event).await,
            Some(event) = user_events.recv() => session.on_user_event(event),
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => session.execute(command).await,
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    session.game_transport.destroy();
    session.user_transport.destroy();
    let queued = session.sync.queued_moves().len();
    if queued > 0 {
        tracing::info!(
            "{} move(s) left in {}; they will be replayed next time",
            queued,
            options.queue_file.display()
        );
    }
    tracing::info!("Client session ended normally");

    Ok(())
}
