use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Query},
    http::{request::Parts, StatusCode},
};
use serde::Deserialize;
use syncwatch_core::Principal;

use crate::ServerContext;

/// The header an upstream auth layer sets to the authenticated principal id
pub const IDENTITY_HEADER: &str = "x-syncwatch-user";

/// The identity a request claims, if any. Browsers can't set headers on a
/// WebSocket upgrade, so the `user` query parameter is accepted as well.
pub struct Identity(pub Option<String>);

/// A request that must come from a known principal
pub struct Caller(pub Principal);

#[derive(Deserialize)]
struct IdentityQuery {
    user: Option<String>,
}

impl Identity {
    fn from_parts(parts: &Parts) -> Self {
        let from_header = parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|x| x.to_str().ok())
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(str::to_string);

        let identity = from_header.or_else(|| {
            Query::<IdentityQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|q| q.0.user)
                .filter(|x| !x.trim().is_empty())
        });

        Self(identity)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    ServerContext: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        let Identity(identity) = Identity::from_parts(parts);
        let identity = identity.ok_or((StatusCode::UNAUTHORIZED, "Missing identity"))?;

        Ok(Self(Principal::new(identity, context.coordinator.config())))
    }
}

#[cfg(test)]
mod test {
    use axum::http::Request;

    use super::{Identity, IDENTITY_HEADER};

    fn identity(request: Request<()>) -> Option<String> {
        let (parts, _) = request.into_parts();
        Identity::from_parts(&parts).0
    }

    #[test]
    fn header_wins_over_query() {
        let request = Request::builder()
            .uri("/v1/gateway?user=bob")
            .header(IDENTITY_HEADER, "alice")
            .body(())
            .unwrap();

        assert_eq!(identity(request), Some("alice".into()));
    }

    #[test]
    fn query_is_used_without_header() {
        let request = Request::builder()
            .uri("/v1/gateway?user=bob")
            .body(())
            .unwrap();

        assert_eq!(identity(request), Some("bob".into()));
    }

    #[test]
    fn blank_identities_are_anonymous() {
        let request = Request::builder()
            .uri("/v1/gateway?user=")
            .header(IDENTITY_HEADER, "  ")
            .body(())
            .unwrap();

        assert_eq!(identity(request), None);
    }
}
