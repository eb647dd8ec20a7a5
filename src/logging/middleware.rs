//! Per-request logging and `x-request-id` handling.

use std::time::Instant;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

fn request_id(request: &Request) -> String {
    request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// One line per finished request. Auth denials log at info, other 4xx at
/// warn, 5xx at error.
///
/// The authorization header is never logged.
pub async fn log_request(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let id = request_id(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let authed = request
        .headers()
        .contains_key(axum::http::header::AUTHORIZATION);

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    macro_rules! emit {
        ($level:ident, $msg:literal) => {
            tracing::$level!(
                request_id = %id,
                %method,
                %path,
                status = status.as_u16(),
                elapsed_ms,
                authed,
                $msg
            )
        };
    }

    match status {
        s if s.is_server_error() => emit!(error, "request failed"),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => emit!(info, "request denied"),
        s if s.is_client_error() => emit!(warn, "request rejected"),
        _ => emit!(debug, "request served"),
    }

    response
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
