mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::AppStateInner;
use parley_crypto::{AesGcmCipher, keys::key_from_secret};
use parley_db::Database;
use parley_gateway::connection;
use parley_gateway::{Handshake, Hub, HubConfig, LocalBroadcaster, Stores};

use crate::config::Config;

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_server=debug,parley_gateway=debug,parley_api=debug,parley_db=debug,\
                 tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let cipher = Arc::new(AesGcmCipher::new(&key_from_secret(&config.encryption_key)?));

    let hub = Hub::new(
        &HubConfig {
            jwt_secret: config.jwt_secret.clone(),
            store_timeout: config.store_timeout,
            summary_timeout: config.summary_timeout,
            outbound_buffer: config.outbound_buffer,
        },
        Stores::sqlite(&db),
        cipher,
        Arc::new(LocalBroadcaster::new()),
    );

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(hub.clone());

    let app = Router::new()
        .merge(parley_api::router(Arc::new(AppStateInner { hub })))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The token is checked before the upgrade; a bad one never gets a socket.
async fn ws_upgrade(
    State(hub): State<Hub>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let handshake = Handshake {
        token: query.token,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let identity = match hub.registry().authenticate(&handshake) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("gateway handshake rejected: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| connection::handle_connection(socket, hub, identity))
}
