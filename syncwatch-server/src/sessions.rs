use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json,
};
use syncwatch_collab::SessionId;

use crate::{
    auth::Caller,
    context::ServerContext,
    errors::ServerResult,
    schemas::{ChatQuery, NewSessionSchema, ValidatedJson},
    serialized::{ChatMessage, Member, Session, Snapshot, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/sessions",
    tag = "sessions",
    responses(
        (status = 200, body = Vec<Session>)
    )
)]
async fn list_sessions(State(context): State<ServerContext>) -> Json<Vec<Session>> {
    let coordinator = &context.coordinator;
    let sessions = coordinator.sessions().list(coordinator.now());

    Json(sessions.to_serialized())
}

#[utoipa::path(
    post,
    path = "/v1/sessions",
    tag = "sessions",
    request_body = NewSessionSchema,
    security(
        ("UserHeader" = [])
    ),
    responses(
        (status = 200, body = Session),
        (status = 401, description = "No identity was supplied")
    )
)]
async fn create_session(
    State(context): State<ServerContext>,
    Caller(principal): Caller,
    ValidatedJson(body): ValidatedJson<NewSessionSchema>,
) -> ServerResult<Json<Session>> {
    let session = context
        .coordinator
        .context()
        .create_session(&body.name, &principal)?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, body = Snapshot),
        (status = 404, description = "The session doesn't exist")
    )
)]
async fn session(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
) -> ServerResult<Json<Snapshot>> {
    let snapshot = context.coordinator.context().snapshot(&SessionId::from(id))?;

    Ok(Json(snapshot.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{id}",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    security(
        ("UserHeader" = [])
    ),
    responses(
        (status = 204, description = "Session was deleted and its members notified"),
        (status = 403, description = "Only the owner or an administrator may delete a session"),
        (status = 404, description = "The session doesn't exist")
    )
)]
async fn delete_session(
    State(context): State<ServerContext>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    context
        .coordinator
        .context()
        .delete_session(&SessionId::from(id), &principal)?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}/members",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, body = Vec<Member>, description = "Members that are currently alive")
    )
)]
async fn members(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
) -> ServerResult<Json<Vec<Member>>> {
    let coordinator = &context.coordinator;
    let now = coordinator.now();
    let members = coordinator
        .presence()
        .active_members(&SessionId::from(id), now)?;

    Ok(Json(members.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}/chat",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session id"),
        ChatQuery
    ),
    responses(
        (status = 200, body = Vec<ChatMessage>, description = "Most recent messages, oldest first")
    )
)]
async fn chat(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
    Query(query): Query<ChatQuery>,
) -> ServerResult<Json<Vec<ChatMessage>>> {
    let coordinator = &context.coordinator;
    let limit = query
        .limit
        .unwrap_or(coordinator.config().chat_history_limit);

    let session = coordinator.sessions().get(&SessionId::from(id))?;

    Ok(Json(session.recent_chat(limit).to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:id", get(session).delete(delete_session))
        .route("/sessions/:id/members", get(members))
        .route("/sessions/:id/chat", get(chat))
}
