use axum::{http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}
