use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    auth::IDENTITY_HEADER,
    gateway, health,
    health::Health,
    schemas::NewSessionSchema,
    serialized::{ChatMessage, Member, Playback, Session, Snapshot},
    sessions,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        gateway::gateway,
        sessions::list_sessions,
        sessions::create_session,
        sessions::session,
        sessions::delete_session,
        sessions::members,
        sessions::chat,
        health::health,
    ),
    components(schemas(Session, Playback, Member, ChatMessage, Snapshot, NewSessionSchema, Health)),
    modifiers(&Security),
    info(
        description = "syncwatch-server coordinates watch sessions over a JSON gateway, and exposes them over HTTP"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = ApiKey::Header(ApiKeyValue::new(IDENTITY_HEADER));

            components.add_security_scheme("UserHeader", SecurityScheme::ApiKey(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
