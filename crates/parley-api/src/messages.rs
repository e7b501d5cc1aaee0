use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_gateway::Identity;
use parley_gateway::validate::Submission;
use parley_types::api::{Ack, AckReason, SendMessageRequest};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub room_id: Uuid,
    /// Messages that gained the caller in read-by on this call.
    pub updated: u64,
}

/// HTTP status for a refused operation.
pub fn status_for(reason: AckReason) -> StatusCode {
    match reason {
        AckReason::Unauthorized => StatusCode::UNAUTHORIZED,
        AckReason::InvalidRoom
        | AckReason::EmptyContent
        | AckReason::InvalidType
        | AckReason::InvalidProvisionalId => StatusCode::BAD_REQUEST,
        AckReason::NotInRoom | AckReason::Blocked | AckReason::Forbidden => StatusCode::FORBIDDEN,
        AckReason::NotFound => StatusCode::NOT_FOUND,
        AckReason::AlreadyDeleted | AckReason::NotDeleted => StatusCode::CONFLICT,
        AckReason::EncryptionFailed | AckReason::MessageSaveFailed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn rejected(reason: AckReason) -> Response {
    (status_for(reason), Json(Ack::rejected(reason))).into_response()
}

/// Same path as a gateway `chat_message`: the message is stored, broadcast
/// to the room's live connections, and the ack is the response body.
/// The submission runs in its own task so a dropped request cannot stop it
/// between persistence and broadcast.
pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let submission = match Submission::from_request(room_id, req) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(user = %identity.user_id, "send rejected: {}", e);
            return rejected(e.reason());
        }
    };

    let hub = state.hub.clone();
    let user_id = identity.user_id;
    let submitting =
        tokio::spawn(async move { hub.pipeline().submit(Some(&identity), submission).await });
    let ack = match submitting.await {
        Ok(ack) => ack,
        Err(e) => {
            error!(user = %user_id, "submission task failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match ack.reason {
        None => (StatusCode::CREATED, Json(ack)).into_response(),
        Some(reason) => (status_for(reason), Json(ack)).into_response(),
    }
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Response {
    match state.hub.relay().mark_read(&identity, room_id).await {
        Ok(updated) => Json(ReadResponse { room_id, updated }).into_response(),
        Err(e) => {
            warn!(user = %identity.user_id, %room_id, "mark read failed: {}", e);
            rejected(e.reason())
        }
    }
}

/// Soft delete. Only the sender may do this.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Response {
    match state.hub.deletion().delete(&identity, message_id).await {
        Ok(deleted_at) => Json(Ack::accepted(message_id, deleted_at, None)).into_response(),
        Err(e) => {
            warn!(user = %identity.user_id, %message_id, "delete failed: {}", e);
            rejected(e.reason())
        }
    }
}

pub async fn restore_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Response {
    match state.hub.deletion().restore(&identity, message_id).await {
        Ok(()) => {
            info!(user = %identity.user_id, %message_id, "restore via api");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!(user = %identity.user_id, %message_id, "restore failed: {}", e);
            rejected(e.reason())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_mistakes_are_4xx_and_store_failures_5xx() {
        assert_eq!(status_for(AckReason::EmptyContent), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(AckReason::Blocked), StatusCode::FORBIDDEN);
        assert_eq!(status_for(AckReason::AlreadyDeleted), StatusCode::CONFLICT);
        assert_eq!(status_for(AckReason::MessageSaveFailed), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
