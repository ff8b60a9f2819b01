mod auth;
mod chat_server;
mod config;
mod db;
mod error;
mod events;
mod handler;
mod models;
mod presence;
mod routes;
mod seeds;
mod server;
mod signaling;

use std::io::{Error, Result};

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, http::header, web};
use auth::{TokenVerifier, fetch_jwk_set};
use chat_server::ChatServer;
use config::Config;
use db::Database;
use handler::ws_connect;
use routes::health::{StartedAt, index};
use server::{extractor_config, rest_scope};
use tokio::signal::unix::{SignalKind, signal};
use tokio::spawn;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(Error::other)?;

    let jwk_set = fetch_jwk_set(&config.jwk_set_uri)
        .await
        .map_err(Error::other)?;
    let verifier = web::Data::new(
        TokenVerifier::from_jwk_set(
            &jwk_set,
            config.auth_audience.as_deref(),
            config.auth_issuer.as_deref(),
        )
        .map_err(Error::other)?,
    );
    log::info!("Loaded {} signing keys", jwk_set.keys.len());

    let db = Database::connect(&config.mongodb_uri, &config.database_name)
        .await
        .map_err(Error::other)?;
    db.ensure_indexes().await.map_err(Error::other)?;
    log::info!("Connected to MongoDB database {}", config.database_name);

    if config.seed_demo_data {
        if let Err(err) = seeds::demo::seed_demo_data(&db).await {
            log::error!("Failed to seed demo data: {}", err);
        }
    }

    let (chat_server, chat_handle) = ChatServer::new();
    let chat_server_handle = spawn(chat_server.run(db.clone()));

    let started = StartedAt::now();
    let frontend_url = config.frontend_url.clone();

    let http_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(db.clone()))
            .app_data(verifier.clone())
            .app_data(web::Data::new(chat_handle.clone()))
            .app_data(web::Data::new(started))
            .configure(extractor_config)
            .route("/", web::get().to(index))
            .service(
                web::scope("/api")
                    .route("/ws", web::get().to(ws_connect))
                    .configure(rest_scope),
            )
            .wrap(cors)
            .wrap(Logger::default())
    })
    .workers(config.workers)
    .bind((config.host.as_str(), config.port))?
    .run();

    log::info!("Listening on {}:{}", config.host, config.port);

    let mut term_signal = signal(SignalKind::terminate())?;
    let mut int_signal = signal(SignalKind::interrupt())?;

    tokio::select! {
        result = http_server => {
            if let Err(err) = result {
                log::error!("HTTP server stopped: {}", err);
            }
        }
        result = chat_server_handle => log::error!("Chat server stopped: {:?}", result),
        _ = term_signal.recv() => log::info!("Received SIGTERM"),
        _ = int_signal.recv() => log::info!("Received SIGINT"),
    }

    log::info!("Shutting down...");
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    Ok(())
}
