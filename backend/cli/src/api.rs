use std::sync::Arc;

use apibot_commands::RendererRegistry;
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

/// Shared application state for API handlers.
pub struct AppState {
    pub registry: Arc<RendererRegistry>,
}

/// Build the Axum router with the API routes, merged with the channel webhook routes.
pub fn build_router(state: Arc<AppState>, webhook_router: Option<Router>) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(health))
        .route("/api/commands", get(list_commands))
        .with_state(state);

    if let Some(webhook_router) = webhook_router {
        app = app.merge(webhook_router);
    }

    app
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "apibot",
        "version": env!("CARGO_PKG_VERSION"),
        "commands": state.registry.len(),
    }))
}

/// Registered commands with their argument names and descriptions.
async fn list_commands(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "commands": state.registry.commands() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apibot_core::CommandConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn app() -> Router {
        let registry = RendererRegistry::default();
        registry.add(
            "/country",
            CommandConfig::new("/country", "https://x/${args.name}", "${body.name}").with_args(["name"]),
        );
        build_router(
            Arc::new(AppState {
                registry: Arc::new(registry),
            }),
            None,
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_command_count() {
        let (status, body) = get_json(app(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["commands"], 1);
    }

    #[tokio::test]
    async fn lists_commands() {
        let (status, body) = get_json(app(), "/api/commands").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["commands"][0]["cmd"], "/country");
        assert_eq!(body["commands"][0]["args"], json!(["name"]));
    }

    #[tokio::test]
    async fn merges_webhook_routes() {
        let webhook = Router::new().route("/webhook", get(|| async { "hook" }));
        let app = build_router(
            Arc::new(AppState {
                registry: Arc::new(RendererRegistry::default()),
            }),
            Some(webhook),
        );
        let response = app
            .oneshot(Request::builder().uri("/webhook").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
