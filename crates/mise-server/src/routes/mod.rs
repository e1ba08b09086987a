//! HTTP route handlers under `/api`.

pub mod conversations;
pub mod health;
pub mod llm;
pub mod profiles;
pub mod recipes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(recipes::routes())
        .merge(conversations::routes())
        .merge(profiles::routes())
        .merge(llm::routes())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Router harness for handler tests.

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use mise_llm::LlmClient;
    use mise_pipeline::test_support::MapFetcher;
    use tower::ServiceExt;

    use crate::state::AppState;

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub fetcher: Arc<MapFetcher>,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        pub fn new(llm: Option<Arc<dyn LlmClient>>, fetcher: MapFetcher) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let fetcher = Arc::new(fetcher);
            let state = Arc::new(AppState::for_tests(dir.path(), llm, fetcher.clone()));
            Self {
                state,
                fetcher,
                _dir: dir,
            }
        }

        pub fn router(&self) -> Router {
            super::build_router(self.state.clone())
        }

        pub async fn send(
            &self,
            method: &str,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }
    }
}
