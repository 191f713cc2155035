use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use syncwatch_core::CoordinatorError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<CoordinatorError> for ServerError {
    fn from(value: CoordinatorError) -> Self {
        match value {
            CoordinatorError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            e @ CoordinatorError::NotAuthorized { .. } => Self::Forbidden(e.to_string()),
            e @ CoordinatorError::InvalidArgument(_) => Self::BadRequest(e.to_string()),
            e @ (CoordinatorError::AlreadyMember(_) | CoordinatorError::NotMember) => {
                Self::Conflict(e.to_string())
            }
            e => Self::Unknown(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use axum::http::StatusCode;
    use syncwatch_core::CoordinatorError;

    use super::ServerError;

    fn status(error: CoordinatorError) -> StatusCode {
        ServerError::from(error).as_status_code()
    }

    #[test]
    fn coordinator_errors_map_to_status_codes() {
        assert_eq!(
            status(CoordinatorError::session_not_found("abc")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(CoordinatorError::NotAuthorized { action: "delete" }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(CoordinatorError::invalid("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(CoordinatorError::NotMember), StatusCode::CONFLICT);
        assert_eq!(
            status(CoordinatorError::IdExhausted(8)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
