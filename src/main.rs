use actix::Actor;
use actix_web::{web, App, HttpServer};
use log::info;
use std::io;

use one_hint_chess::game::{ArchiveStore, GameSession, JsonFileArchive, SystemTime};
use one_hint_chess::models::{AppState, GameOptions, ServerConfig};
use one_hint_chess::routes::configure_routes;
use one_hint_chess::websocket::SessionActor;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config =
        ServerConfig::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    info!("Archive at {}", config.archive_path.display());

    let archive = ArchiveStore::new(Box::new(JsonFileArchive::new(&config.archive_path)));
    let session = GameSession::standard(GameOptions::default(), Box::new(SystemTime::new()), archive)
        .with_engine_depth(config.engine_depth);
    let session = SessionActor::new(session, config.tick, config.engine_path.clone()).start();

    info!("Starting chess server at http://{}", config.bind);

    let bind = config.bind.clone();
    let static_dir = config.static_dir.clone();
    let app_state = web::Data::new(AppState { session, config });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(|cfg| configure_routes(cfg, &static_dir))
    })
    .bind(bind)?
    .run()
    .await
}
