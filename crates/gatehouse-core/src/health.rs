use axum::http::StatusCode;

/// `GET /healthz`: liveness probe.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /readyz`: readiness probe. A service with external dependencies
/// mounts its own handler instead of this default.
pub async fn readyz() -> StatusCode {
    StatusCode::OK
}
