use std::{sync::Arc, time::Instant};

use axum::extract::FromRef;
use syncwatch_collab::Coordinator;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub coordinator: Arc<Coordinator>,
    /// When the server started, for the health report
    pub started_at: Instant,
}

impl ServerContext {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            started_at: Instant::now(),
        }
    }
}
