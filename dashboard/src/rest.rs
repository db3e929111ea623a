use crate::metrics::gather_metrics;
use crate::state::DashboardState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::sync::watch;
use tracing::error;

#[derive(Debug, Clone)]
struct AppState {
    dashboard: watch::Receiver<DashboardState>,
}

pub fn create_router(dashboard: watch::Receiver<DashboardState>) -> Router {
    let state = AppState { dashboard };

    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/api/v1/state", get(get_state))
        .with_state(state)
}

async fn get_state(State(state): State<AppState>) -> Json<DashboardState> {
    Json(state.dashboard.borrow().clone())
}

async fn get_metrics() -> Result<String, AppError> {
    Ok(gather_metrics()?)
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
