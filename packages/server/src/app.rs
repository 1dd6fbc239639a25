//! Dependency wiring for the in-memory deployment.

use std::sync::Arc;

use checkers_shared::time::{Clock, SystemClock};

use crate::{
    config::HubConfig,
    domain::EventHub,
    infrastructure::{
        emitter::EventEmitter, hub::InMemoryEventHub, repository::InMemoryGameRepository,
    },
    ui::{Server, state::AppState},
    usecase::{
        ApplyMoveUseCase, CreateGameUseCase, GetGameUseCase, JoinGameUseCase, ResignGameUseCase,
        RespondDrawUseCase, SendChatUseCase, SubscribeUseCase,
    },
};

/// Build a server backed by the in-memory repository and hub.
pub fn build_server(config: HubConfig) -> Server {
    build_server_with_clock(config, Arc::new(SystemClock))
}

/// Same as [`build_server`] with an explicit clock.
pub fn build_server_with_clock(config: HubConfig, clock: Arc<dyn Clock>) -> Server {
    // Initialize dependencies in order:
    // 1. Repository
    // 2. EventHub / EventEmitter
    // 3. UseCases
    // 4. AppState

    // 1. Create Repository (in-memory database)
    let repository = Arc::new(InMemoryGameRepository::new());

    // 2. Create EventHub and EventEmitter
    let hub: Arc<dyn EventHub> = Arc::new(InMemoryEventHub::new(
        clock.clone(),
        config.stale_timeout,
    ));
    let emitter = Arc::new(EventEmitter::new(config.emitter_capacity));

    // 3. Create UseCases
    let create_game_usecase = Arc::new(CreateGameUseCase::new(repository.clone(), clock.clone()));
    let join_game_usecase = Arc::new(JoinGameUseCase::new(
        repository.clone(),
        emitter.clone(),
        clock.clone(),
    ));
    let get_game_usecase = Arc::new(GetGameUseCase::new(repository.clone()));
    let apply_move_usecase = Arc::new(ApplyMoveUseCase::new(
        repository.clone(),
        emitter.clone(),
        clock.clone(),
    ));
    let resign_game_usecase = Arc::new(ResignGameUseCase::new(
        repository.clone(),
        emitter.clone(),
        clock.clone(),
    ));
    let respond_draw_usecase = Arc::new(RespondDrawUseCase::new(
        repository.clone(),
        emitter.clone(),
        clock.clone(),
    ));
    let send_chat_usecase = Arc::new(SendChatUseCase::new(
        repository.clone(),
        emitter.clone(),
        clock.clone(),
    ));
    let subscribe_usecase = Arc::new(SubscribeUseCase::new(
        repository,
        hub.clone(),
        emitter.clone(),
        clock,
    ));

    // 4. Create AppState
    let state = Arc::new(AppState {
        create_game_usecase,
        join_game_usecase,
        get_game_usecase,
        apply_move_usecase,
        resign_game_usecase,
        respond_draw_usecase,
        send_chat_usecase,
        subscribe_usecase,
        hub: hub.clone(),
    });

    Server::new(state, emitter, hub, config)
}
