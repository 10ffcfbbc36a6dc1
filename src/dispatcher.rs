//! Request dispatch.
//!
//! # Pipeline
//! ```text
//! request
//!     → capture JSON request body (when request logging is on)
//!     → match endpoint
//!         miss → proxy fallback, or 404
//!     → no template → configured status, empty body
//!     → render template → must be valid JSON → configured status + body
//! ```
//!
//! Every exit goes through [`Exchange::respond`], which writes the access
//! line and any captured bodies. Failures never reach the client in detail:
//! they get a generic message and the reason is logged.

use crate::config::{Endpoint, Logging};
use crate::error::MatchError;
use crate::logging::{pretty_json, Exchange};
use crate::proxy::ProxyForwarder;
use crate::server::AppState;
use crate::template::{self, is_json};
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{error, warn};

const NOT_FOUND_MESSAGE: &str = "Not found\n";
const GENERIC_ERROR_MESSAGE: &str = "Unknown error has occurred, see logs\n";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Entry point for every request.
pub async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let mut exchange = Exchange::new(&request);
    let request = capture_request_body(&state.config.logging, &mut exchange, request).await;

    let found = state.matcher.find_match(
        &state.config.endpoints,
        request.method().as_str(),
        exchange.uri(),
    );
    let endpoint = match found {
        Ok(endpoint) => endpoint,
        Err(MatchError::NotFound) => {
            return match &state.proxy {
                Some(proxy) => forward(proxy, &state.config.logging, exchange, request).await,
                None => exchange.respond((StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE).into_response()),
            };
        }
        Err(e) => {
            error!(
                uri = %exchange.uri(),
                method = %exchange.method(),
                error = %e,
                "Unknown error in endpoint matching"
            );
            return exchange.respond(internal_error());
        }
    };

    respond_with_stub(endpoint, &state.config.logging, exchange, request.headers())
}

fn respond_with_stub(
    endpoint: &Endpoint,
    logging: &Logging,
    mut exchange: Exchange,
    headers: &HeaderMap,
) -> Response {
    let Ok(status) = StatusCode::from_u16(endpoint.response_code) else {
        error!(
            uri = %endpoint.uri,
            method = %endpoint.method,
            response_code = endpoint.response_code,
            "Endpoint has an unusable response code"
        );
        return exchange.respond(internal_error());
    };

    if endpoint.template_path().is_none() {
        return exchange.respond(status.into_response());
    }

    let rendered = match template::render(endpoint, Some(headers)) {
        Ok(rendered) => rendered,
        Err(e) => {
            error!(
                uri = %endpoint.uri,
                method = %endpoint.method,
                error = %e,
                "Unknown error in parsing response"
            );
            return exchange.respond(internal_error());
        }
    };

    if logging.response_contents {
        exchange.set_stub_body(&rendered, &endpoint.variables);
    }

    // Header values are substituted per request, so startup validation is
    // not enough.
    if !is_json(&rendered) {
        error!(
            uri = %endpoint.uri,
            method = %endpoint.method,
            "Rendered response is not valid JSON"
        );
        return exchange.respond(internal_error());
    }

    exchange.respond((status, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], rendered).into_response())
}

async fn forward(
    proxy: &ProxyForwarder,
    logging: &Logging,
    mut exchange: Exchange,
    request: Request,
) -> Response {
    exchange.mark_proxied();
    let (parts, body) = request.into_parts();

    let result = proxy
        .forward(parts.method, exchange.uri(), &parts.headers, body)
        .await;

    match result {
        Ok(proxied) => {
            if logging.response_contents {
                exchange.set_proxied_body(&proxied.body);
            }
            exchange.respond(proxied.into_response())
        }
        Err(e) => {
            error!(
                uri = %exchange.uri(),
                method = %exchange.method(),
                upstream = %proxy.origin(),
                error = %e,
                "Error proxying request"
            );
            let status = if e.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
            exchange.respond((status, GENERIC_ERROR_MESSAGE).into_response())
        }
    }
}

/// Buffer and pretty-print a JSON request body for the log, then put the
/// bytes back so later stages can still read them.
async fn capture_request_body(
    logging: &Logging,
    exchange: &mut Exchange,
    request: Request,
) -> Request {
    if !logging.request_contents || !declares_json_body(request.headers()) {
        return request;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Error reading request body");
            Bytes::new()
        }
    };

    match pretty_json(&bytes) {
        Ok(pretty) => exchange.set_request_body(pretty),
        Err(e) => warn!(uri = %exchange.uri(), error = %e, "Error fetching request body: invalid JSON"),
    }

    Request::from_parts(parts, Body::from(bytes))
}

/// Non-zero `Content-Length` and an `application/json` media type.
fn declares_json_body(headers: &HeaderMap) -> bool {
    let has_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|length| length > 0);

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE));

    has_length && is_json
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE).into_response()
}
