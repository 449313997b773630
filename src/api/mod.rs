use crate::domain::owner::OwnerId;
use crate::domain::token::TokenId;
use crate::error::AppError;
use crate::services::dispatch::NotificationDispatcher;
use crate::services::push_token_service::PushTokenService;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod health;
pub mod notifications;
pub mod push_tokens;
pub mod schemas;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct AppState<Id: OwnerId> {
    pub push_token_service: PushTokenService<Id>,
    pub dispatcher: NotificationDispatcher<Id>,
}

pub(crate) fn parse_owner<Id: OwnerId>(raw: &str) -> Result<Id, AppError> {
    raw.parse().map_err(|_| AppError::BadRequest(format!("Invalid {} owner id: {raw}", Id::KIND)))
}

pub(crate) fn parse_token_id(raw: &str) -> Result<TokenId, AppError> {
    raw.parse().map_err(|_| AppError::BadRequest(format!("Invalid token id: {raw}")))
}

/// Configures and returns the application router.
pub fn app_router<Id: OwnerId>(state: AppState<Id>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/{user_id}/token", post(push_tokens::register_token::<Id>))
        .route(
            "/{user_id}/token/{token_id}",
            put(push_tokens::update_token::<Id>).delete(push_tokens::delete_token::<Id>),
        )
        .route("/{user_id}/send-notification", post(notifications::send_notification::<Id>))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), MakeRequestUuid))
        .with_state(state)
}
