//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::HubConfig,
    domain::EventHub,
    infrastructure::{emitter::EventEmitter, emitter::spawn_hub_bridge, hub::spawn_maintenance},
};

use super::{
    handler::{
        create_game, debug_hub_stats, game_events, get_game, health_check, join_game,
        resign_game, respond_draw, send_chat, submit_move, user_events,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // SSE エンドポイント
        .route("/api/events/games/{game_id}", get(game_events))
        .route("/api/events/users/{user_id}", get(user_events))
        // HTTP エンドポイント
        .route("/api/games", post(create_game))
        .route("/api/games/{game_id}", get(get_game))
        .route("/api/games/{game_id}/join", post(join_game))
        .route("/api/games/{game_id}/moves", post(submit_move))
        .route("/api/games/{game_id}/chat", post(send_chat))
        .route("/api/games/{game_id}/draw", post(respond_draw))
        .route("/api/games/{game_id}/resign", post(resign_game))
        .route("/api/health", get(health_check))
        .route("/debug/hub", get(debug_hub_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Checkers sync server
///
/// Owns the application state plus the emitter and hub, whose background
/// tasks (hub bridge, heartbeat/sweep) live as long as `serve` runs.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(app_state, emitter, hub, HubConfig::default());
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
    /// EventEmitter（Hub ブリッジの購読元）
    emitter: Arc<EventEmitter>,
    hub: Arc<dyn EventHub>,
    config: HubConfig,
}

impl Server {
    pub fn new(
        state: Arc<AppState>,
        emitter: Arc<EventEmitter>,
        hub: Arc<dyn EventHub>,
        config: HubConfig,
    ) -> Self {
        Self {
            state,
            emitter,
            hub,
            config,
        }
    }

    /// Run the server until Ctrl+C / SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Checkers server listening on {}", listener.local_addr()?);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// On shutdown the hub is destroyed first so that open event streams end
    /// and graceful shutdown can complete.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bridge = spawn_hub_bridge(&self.emitter, self.hub.clone());
        let maintenance = spawn_maintenance(self.hub.clone(), self.config);

        let hub = self.hub.clone();
        let result = axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move {
                shutdown.await;
                hub.destroy().await;
            })
            .await;

        maintenance.abort();
        bridge.abort();
        result?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
