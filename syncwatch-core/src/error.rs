use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    /// A session or member that was referenced doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    /// The requester is neither the owner of the session nor an administrator
    #[error("Not authorized to {action}")]
    NotAuthorized { action: &'static str },
    /// A value is out of range or a required field is empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Connection {0} is already a member of this session")]
    AlreadyMember(u64),
    #[error("Connection is not a member of a session")]
    NotMember,
    #[error("Could not generate a unique session id after {0} attempts")]
    IdExhausted(usize),
}

impl CoordinatorError {
    pub fn session_not_found(identifier: impl ToString) -> Self {
        Self::NotFound {
            resource: "session",
            identifier: identifier.to_string(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// Returns true for errors that are expected during normal operation,
    /// such as a command racing with a leave or a sweep.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NotMember | Self::AlreadyMember(_))
    }
}

/// Rejects NaN and infinite values before they reach any state.
pub fn ensure_finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoordinatorError::invalid(format!("{field} must be a finite number")))
    }
}
