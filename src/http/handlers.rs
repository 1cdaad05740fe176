//! Route handlers.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broadcast::ManagerStatus;
use crate::context::Context;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::model::{Datatype, MessageInput};

/// Header carrying the file name of an uploaded blob.
pub const X_BLOB_NAME: &str = "x-blob-name";

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub node: String,
    pub org: String,
    pub manager: ManagerStatus,
}

fn accepted_or_ok(confirm: bool) -> StatusCode {
    if confirm {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    }
}

pub async fn broadcast_message(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(query): Query<ConfirmQuery>,
    Json(input): Json<MessageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = Context::background();
    let msg = state
        .manager
        .broadcast_message(&ctx, &namespace, input, query.confirm)
        .await?;
    Ok((accepted_or_ok(query.confirm), Json(msg)))
}

pub async fn broadcast_datatype(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(query): Query<ConfirmQuery>,
    Json(mut datatype): Json<Datatype>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = Context::background();
    let msg = state
        .manager
        .broadcast_datatype(&ctx, &namespace, &mut datatype, query.confirm)
        .await?;
    tracing::info!(
        namespace = %namespace,
        datatype = %datatype.name,
        message = %msg.header.id,
        "Datatype broadcast"
    );
    Ok((accepted_or_ok(query.confirm), Json(datatype)))
}

pub async fn upload_blob(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = Context::background();
    let name = headers
        .get(X_BLOB_NAME)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let data = state
        .manager
        .upload_blob(&ctx, &namespace, name, body.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(data)))
}

pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let op = state
        .manager
        .get_operation(&Context::background(), &id)
        .await?;
    Ok(Json(op))
}

pub async fn retry_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let op = state
        .manager
        .retry_operation(&Context::background(), &id)
        .await?;
    Ok(Json(op))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        node: state.node.name.clone(),
        org: state.node.org.clone(),
        manager: state.manager.status(),
    })
}
