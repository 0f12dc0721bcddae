use actix_files as fs;
use actix_web::{web, Either, HttpResponse, Responder};
use log::{error, warn};

use crate::models::{AppState, ArchiveEntry};
use crate::websocket::{ws_index, ListArchive};

/// HTTP handler for the index page
pub async fn index(app_state: web::Data<AppState>) -> impl Responder {
    let path = app_state.config.static_dir.join("index.html");
    match fs::NamedFile::open_async(&path).await {
        Ok(file) => Either::Left(file),
        Err(e) => {
            warn!("No index page at {}: {}", path.display(), e);
            Either::Right(HttpResponse::Ok().body("One Hint Chess"))
        }
    }
}

/// Finished games, newest first
pub async fn archive(app_state: web::Data<AppState>) -> HttpResponse {
    match app_state.session.send(ListArchive).await {
        Ok(games) => {
            let entries: Vec<ArchiveEntry> = games.into_iter().map(ArchiveEntry::from).collect();
            HttpResponse::Ok().json(entries)
        }
        Err(e) => {
            error!("Session actor unavailable: {}", e);
            HttpResponse::ServiceUnavailable().finish()
        }
    }
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: &std::path::Path) {
    cfg.service(web::resource("/ws").route(web::get().to(ws_index)))
        .service(web::resource("/archive").route(web::get().to(archive)))
        .service(web::resource("/").route(web::get().to(index)))
        .service(fs::Files::new("/static", static_dir));
}
