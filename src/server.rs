//! Axum router construction and request dispatch.
//!
//! The [`app`] function wires the probe endpoints (`/health`, `/metrics`)
//! and sends every other path to the configured signing backend via a
//! fallback handler. The gateway speaks only GET and HEAD; the backend
//! answers with a signed redirect or a request error, and this module
//! shapes either into the HTTP response.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics::counter;
use percent_encoding::percent_decode_str;
use tracing::warn;

use crate::backend::SignedRedirect;
use crate::metrics::{metrics_handler, metrics_middleware, HANDLER_ERRORS_TOTAL, REDIRECTS_TOTAL};
use crate::AppState;

/// Value of the `Server` header stamped on every response.
pub const SERVER_HEADER_VALUE: &str = "obs-access-signer";

// -- Router -------------------------------------------------------------------

/// Build the axum application router.
///
/// Probe endpoints shadow object keys of the same name; an object named
/// `health` stays reachable by disabling the probe in the config.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    if state.config.observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Every other path is an object key, whatever the method. The
        // fallback rejects anything that is not GET or HEAD itself so the
        // error response carries the x-error-code header.
        .fallback(handle_object)
        .with_state(state)
        // Layer ordering: inner layers run first on the request path.
        // metrics_middleware is outermost so it captures the full request
        // lifecycle including header stamping.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health` -- liveness probe.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// Fallback handler: resolve the request path to an object key, ask the
/// backend for a signed redirect, and answer with it.
async fn handle_object(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let method = req.method().clone();
    let head = method == Method::HEAD;

    // Axum hands over the raw, still percent-encoded path; backends work
    // on the decoded object key.
    let path = percent_decode_str(req.uri().path())
        .decode_utf8_lossy()
        .into_owned();

    let backend = state.backend.name();
    let mut response = match state.backend.handle(method, path).await {
        Ok(redirect) => {
            counter!(
                REDIRECTS_TOTAL,
                "backend" => backend,
                "status" => redirect.status.as_u16().to_string()
            )
            .increment(1);
            redirect_response(&redirect)
        }
        Err(err) => {
            warn!(
                "request failed: backend={} code={} err={}",
                backend,
                err.code(),
                err
            );
            counter!(HANDLER_ERRORS_TOTAL, "backend" => backend, "code" => err.code())
                .increment(1);
            err.into_response()
        }
    };

    // HEAD answers never carry a body, on any outcome including errors.
    if head {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    }

    response
}

/// Shape a signed redirect into the HTTP response: resolved status,
/// `Location`, and the policy's cache headers when present.
fn redirect_response(redirect: &SignedRedirect) -> Response {
    let mut builder = Response::builder()
        .status(redirect.status)
        .header(header::LOCATION, redirect.target_url.as_str());

    if let Some(cache) = &redirect.cache {
        builder = builder
            .header(header::CACHE_CONTROL, cache.cache_control.as_str())
            .header(header::EXPIRES, cache.expires.as_str());
    }

    builder.body(Body::empty()).unwrap_or_else(|err| {
        warn!("building redirect response failed: {err}");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

// -- Middleware ---------------------------------------------------------------

/// Middleware that stamps identification headers on every response:
/// `Date` and `Server`.
async fn common_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static(SERVER_HEADER_VALUE));

    response
}

// -- Tests -------------------------------------------------------------------
