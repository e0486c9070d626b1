use crate::AppState;
use faststr::FastStr;
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{info, warn};
use volo_http::{
    response::Response,
    server::{IntoResponse, Router, param::PathParams, route::get},
    utils::Extension,
};

async fn lookup_handler(
    Extension(state): Extension<AppState>,
    PathParams((cache, key)): PathParams<(FastStr, FastStr)>,
) -> Response {
    let (Some(cache), Some(key)) = (decode_segment(&cache), decode_segment(&key)) else {
        warn!(cache = %cache, key = %key, "path segment is not valid utf-8");
        return (StatusCode::NOT_FOUND, not_found()).into_response();
    };
    let Some(upstream) = state.cache(&cache) else {
        warn!(cache = %cache, "lookup on unknown cache");
        return (StatusCode::NOT_FOUND, not_found()).into_response();
    };
    info!(cache = %cache, key = %key, "lookup");
    let result = upstream.get(&key, state.shutdown()).await;
    lookup_response(&cache, &key, result).into_response()
}

pub fn lookup_router() -> Router {
    Router::new().route("/api/v1/{:cache}/{:key}", get(lookup_handler))
}

/// Path parameters arrive still percent-encoded.
fn decode_segment(raw: &str) -> Option<FastStr> {
    percent_decode_str(raw).decode_utf8().ok().map(FastStr::new)
}

/// Upstream failures are reported as not found; the cause stays in the log.
pub(crate) fn lookup_response(
    cache: &str,
    key: &str,
    result: storage::Result<Value>,
) -> (StatusCode, FastStr) {
    match result {
        Ok(value) => (StatusCode::OK, value.to_string().into()),
        Err(e) => {
            warn!(cache, key, error = %e, "lookup failed");
            (StatusCode::NOT_FOUND, not_found())
        }
    }
}

fn not_found() -> FastStr {
    json!({ "error": "not found" }).to_string().into()
}
