use crate::AppState;
use faststr::FastStr;
use reqwest::StatusCode;
use serde_json::json;
use storage::CacheRegistry;
use volo_http::{
    response::Response,
    server::{IntoResponse, Router, route::get},
    utils::Extension,
};

async fn caches_handler(Extension(state): Extension<AppState>) -> Response {
    (StatusCode::OK, cache_list(state.registry())).into_response()
}

pub fn caches_router() -> Router {
    Router::new().route("/api/v1/caches", get(caches_handler))
}

fn cache_list(registry: &CacheRegistry) -> FastStr {
    json!({
        "object": "list",
        "data": registry
            .iter()
            .map(|cache| json!({
                "name": cache.name(),
                "entries": cache.len(),
                "initialized": cache.is_initialized(),
            }))
            .collect::<Vec<_>>(),
    })
    .to_string()
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::upstream_cache;
    use common::CacheSpec;
    use storage::CancellationToken;

    #[tokio::test]
    async fn test_cache_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("covers.json"), r#"{"abc": {"url": "x"}}"#).unwrap();

        let client = crate::tools::build_http_client(std::time::Duration::from_secs(1)).unwrap();
        let mut registry = CacheRegistry::new();
        for name in ["covers", "subjects"] {
            let spec = CacheSpec {
                name:         name.into(),
                url_template: "http://127.0.0.1:9/{key}".into(),
            };
            registry
                .register(upstream_cache(&spec, dir.path(), client.clone()))
                .unwrap();
        }
        registry.initialize_all(&CancellationToken::new()).await;

        let listed: serde_json::Value = serde_json::from_str(&cache_list(&registry)).unwrap();
        assert_eq!(
            listed,
            json!({
                "object": "list",
                "data": [
                    { "name": "covers", "entries": 1, "initialized": true },
                    { "name": "subjects", "entries": 0, "initialized": true },
                ],
            })
        );
    }
}
