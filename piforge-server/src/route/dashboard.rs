use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{AppState, counters::Endpoint};

/// Fallback for every path without a route: the dashboard page, read fresh
/// from disk on each request.
pub async fn dashboard(State(state): State<AppState>) -> Result<Response, DashboardError> {
    state.counters.hit(Endpoint::Dashboard);

    let content = tokio::fs::read(state.dashboard_path.as_path()).await?;

    Ok(([(header::CONTENT_TYPE, mime::TEXT_HTML.as_ref())], content).into_response())
}

#[derive(thiserror::Error, Debug)]
pub enum DashboardError {
    #[error("Error loading dashboard")]
    Read(#[from] std::io::Error),
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        match self {
            DashboardError::Read(ref e) => {
                warn!(error = %e, "failed to read dashboard file");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())],
                    self.to_string(),
                )
                    .into_response()
            }
        }
    }
}
