//! Text formatting for the terminal client.

use chrono::{Local, TimeZone};
use checkers_shared::{
    game::{Move, Player},
    protocol::{
        api::{GameSnapshot, GameStatus},
        events::{
            ChatMessagePayload, DrawRequestPayload, DrawResponsePayload, GameMovePayload,
            GameOverPayload, GameOverReason, NotificationPayload, PlayerJoinedPayload,
            PresencePayload,
        },
    },
};

use crate::{
    sync::{QueueKind, ReplayReport, SubmitOutcome, SyncState},
    transport::ConnectionState,
};

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Local wall-clock time (`HH:MM:SS`) of a Unix timestamp in milliseconds.
fn clock_time(timestamp_millis: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_millis)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn status_label(status: GameStatus) -> &'static str {
    match status {
        GameStatus::Waiting => "waiting for opponent",
        GameStatus::Active => "active",
        GameStatus::Completed => "completed",
    }
}

fn seat(name: Option<&str>, me: &str) -> String {
    match name {
        Some(name) if name == me => format!("{} (me)", name),
        Some(name) => name.to_string(),
        None => "(open)".to_string(),
    }
}

/// Formatter for game output
pub struct GameFormatter;

impl GameFormatter {
    /// Format the full game view
    ///
    /// # Arguments
    ///
    /// * `game` - Game state to render (may include unconfirmed local moves)
    /// * `me` - The current user's id (to mark as "me")
    ///
    /// # Returns
    ///
    /// The board with players, turn and status
    pub fn format_board(game: &GameSnapshot, me: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{}\n", RULE));
        output.push_str(&format!(
            "Game {}  (version {}, {} moves, {})\n",
            game.game_id,
            game.version,
            game.move_count,
            status_label(game.status)
        ));
        output.push_str(&format!(
            "Red: {}   Black: {}\n\n",
            seat(game.red_player.as_deref(), me),
            seat(game.black_player.as_deref(), me)
        ));
        output.push_str(&game.board.render());
        output.push('\n');

        match (game.status, game.winner) {
            (GameStatus::Completed, Some(winner)) => {
                output.push_str(&format!("Winner: {}\n", winner));
            }
            (GameStatus::Completed, None) => output.push_str("Game drawn\n"),
            _ => output.push_str(&format!("{} to move\n", game.current_player)),
        }
        if let Some(by) = &game.draw_offered_by {
            output.push_str(&format!("Draw offered by {}\n", by));
        }

        output.push_str(&format!("{}\n", RULE));
        output
    }

    /// Format a move pushed by the server
    pub fn format_move(event: &GameMovePayload, at: i64) -> String {
        let mut output = format!(
            "\n> {} ({}) played {} at {} [v{}]\n",
            event.moved_by,
            event.player,
            event.mv,
            clock_time(at),
            event.version
        );
        if let Some(winner) = event.winner {
            output.push_str(&format!("  {} wins\n", winner));
        } else {
            output.push_str(&format!("  {} to move\n", event.current_player));
        }
        output
    }

    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The chat message payload
    ///
    /// # Returns
    ///
    /// A formatted string with the chat message
    pub fn format_chat_message(message: &ChatMessagePayload) -> String {
        format!(
            "\n{}\n@{}: {}\nsent at {}\n{}\n",
            THIN_RULE,
            message.user_id,
            message.content,
            clock_time(message.sent_at),
            THIN_RULE
        )
    }

    pub fn format_player_joined(joined: &PlayerJoinedPayload) -> String {
        format!("\n+ {} joined as {}\n", joined.user_id, joined.color)
    }

    pub fn format_presence(presence: &PresencePayload) -> String {
        let marker = if presence.online { "online" } else { "offline" };
        format!("\n* {} is {}\n", presence.user_id, marker)
    }

    pub fn format_draw_request(request: &DrawRequestPayload) -> String {
        format!(
            "\n? {} offers a draw (/draw accept or /draw decline)\n",
            request.from_user
        )
    }

    pub fn format_draw_response(response: &DrawResponsePayload) -> String {
        let verb = if response.accepted {
            "accepted"
        } else {
            "declined"
        };
        format!("\n{} {} the draw offer\n", response.from_user, verb)
    }

    pub fn format_game_over(over: &GameOverPayload) -> String {
        let reason = match over.reason {
            GameOverReason::NoPiecesOrMoves => "no pieces or moves left",
            GameOverReason::Resignation => "resignation",
            GameOverReason::DrawAgreed => "draw agreed",
        };
        match over.winner {
            Some(winner) => format!(
                "\n{}\nGame over: {} wins by {}\n{}\n",
                RULE, winner, reason, RULE
            ),
            None => format!("\n{}\nGame over: {}\n{}\n", RULE, reason, RULE),
        }
    }

    pub fn format_notification(notification: &NotificationPayload) -> String {
        format!("\n[!] {}\n", notification.message)
    }

    pub fn format_connection_state(state: ConnectionState, attempts: u32) -> String {
        match state {
            ConnectionState::Connected => "\n(connected)\n".to_string(),
            ConnectionState::Connecting => "\n(connecting...)\n".to_string(),
            ConnectionState::Reconnecting => {
                format!("\n(connection lost, reconnecting; attempt {})\n", attempts + 1)
            }
            ConnectionState::Disconnected => {
                "\n(disconnected; moves will be queued, /reconnect to retry)\n".to_string()
            }
            ConnectionState::IntentionallyDisconnected => {
                "\n(disconnected; /reconnect to resume)\n".to_string()
            }
        }
    }

    /// Format the result of submitting `mv`
    pub fn format_submit_outcome(mv: Move, outcome: &SubmitOutcome) -> String {
        match outcome {
            SubmitOutcome::Accepted { version } => format!("{} accepted [v{}]\n", mv, version),
            SubmitOutcome::Duplicate => format!("{} already sent\n", mv),
            SubmitOutcome::Queued(QueueKind::Offline) => {
                format!("{} queued (offline); it will be sent on reconnect\n", mv)
            }
            SubmitOutcome::Queued(QueueKind::Retry) => {
                format!("{} not delivered; queued for retry\n", mv)
            }
            SubmitOutcome::Rejected { reason: Some(reason) } => {
                format!("{} rejected ({:?}); board resynchronized\n", mv, reason)
            }
            SubmitOutcome::Rejected { reason: None } => {
                format!("{} rejected; board resynchronized\n", mv)
            }
        }
    }

    pub fn format_replay_report(report: &ReplayReport) -> String {
        match report.failed {
            None => format!("Replayed {} queued move(s)\n", report.replayed),
            Some(_) => format!(
                "Replayed {} queued move(s); stopped at a failure ({} still queued)\n",
                report.replayed, report.remaining
            ),
        }
    }

    /// Format the sync status shown by `/status`
    pub fn format_sync_status(state: &SyncState, pending_updates: usize) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", THIN_RULE));
        output.push_str(&format!("connection: {}\n", state.connection.status));
        if state.connection.reconnect_attempts > 0 {
            output.push_str(&format!(
                "reconnect attempts: {}\n",
                state.connection.reconnect_attempts
            ));
        }
        if let Some(error) = &state.connection.last_error {
            output.push_str(&format!("last error: {}\n", error));
        }
        if let Some(seq) = state.connection.last_sequence {
            output.push_str(&format!("last sequence: {}\n", seq));
        }
        output.push_str(&format!(
            "queued moves: {} offline, {} retry (capacity {})\n",
            state.move_queue.offline.len(),
            state.move_queue.retry.len(),
            state.move_queue.capacity
        ));
        for queued in state.move_queue.ordered() {
            output.push_str(&format!("  #{} {}\n", queued.seq, queued.mv));
        }
        output.push_str(&format!("pending local moves: {}\n", pending_updates));
        if state.optimistic.conflict.is_some() {
            output.push_str("unresolved conflict: /board to refetch\n");
        }
        output.push_str(&format!("{}\n", THIN_RULE));
        output
    }

    pub fn format_turn_hint(game: &GameSnapshot, me: &str) -> Option<String> {
        let seat = match game.current_player {
            Player::Red => game.red_player.as_deref(),
            Player::Black => game.black_player.as_deref(),
        };
        (game.status == GameStatus::Active && seat == Some(me))
            .then(|| "Your turn\n".to_string())
    }

    pub fn format_help() -> String {
        [
            "Commands:",
            "  c3-d4                     play a move",
            "  /chat <text>              send a chat message",
            "  /draw offer|accept|decline",
            "  /resign                   resign the game",
            "  /board                    refetch and show the board",
            "  /status                   connection and queue status",
            "  /replay                   replay queued moves now",
            "  /reconnect                reconnect the event streams",
            "  /pause, /resume           simulate the page going hidden / visible",
            "  /quit                     exit",
            "",
        ]
        .join("\n")
    }
}
