use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use parley_gateway::Handshake;

use crate::AppState;

/// Extract and validate JWT from Authorization header.
/// The verified `Identity` is stored in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let handshake = Handshake {
        token: None,
        authorization,
    };
    let identity = state.hub.registry().authenticate(&handshake).map_err(|e| {
        debug!("rejected request: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
