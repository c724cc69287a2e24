// plantpulse-ingest-core/src/web/server.rs
// HTTP server wiring

use std::sync::Arc;

use actix_web::{web, App, HttpServer};

use crate::runtime::Runtime;
use crate::web::handlers;
use crate::web::middleware::PermissiveCors;

/// Route table shared by the server and the handler tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhook/events", web::post().to(handlers::ingest))
        .route("/data", web::post().to(handlers::ingest))
        .route("/equipment", web::get().to(handlers::equipment_fleet))
        .route("/equipment/{id}", web::get().to(handlers::equipment_status))
        .route(
            "/equipment/{id}/metrics",
            web::get().to(handlers::equipment_metrics),
        )
        .route(
            "/equipment/{id}/history",
            web::get().to(handlers::equipment_history),
        )
        .route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(handlers::metrics));
}

/// Serve until the process is asked to stop, then drain background work
pub async fn run(runtime: Arc<Runtime>) -> std::io::Result<()> {
    let bind_address = runtime.config.server.bind_address.clone();
    let data = web::Data::from(runtime.clone());

    log::info!("server: listening on {}", bind_address);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(PermissiveCors)
            .configure(configure)
    })
    .bind(&bind_address)?
    .run();

    let result = server.await;
    runtime.shutdown().await;
    result
}
