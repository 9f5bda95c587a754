#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Builds the real router over an in-memory store loaded from the
//! play/poem/author fixtures, so requests exercise the full pipeline.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use mosaic_kernel::aggregate::{AggregateRegistry, AggregateView};
use mosaic_kernel::cache::MokaSourceSetCache;
use mosaic_kernel::store::Store;
use mosaic_kernel::{AppState, Config, routes};

/// Site URL used for absolute links in responses.
pub const SITE_URL: &str = "http://testserver";

/// Store holding the Play, Poem and Author tables.
pub fn shakespeare_store() -> Store {
    Store::from_json(&mosaic_test_utils::shakespeare_dataset().to_string())
        .expect("fixture dataset should load")
}

/// Test application wrapping the real router.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// App serving the given views over `store`.
    pub fn with_views(store: Store, views: Vec<AggregateView>) -> Self {
        let registry = AggregateRegistry::new();
        for view in views {
            registry.register(view).expect("view should register");
        }
        Self::from_registry(store, registry, MokaSourceSetCache::default())
    }

    /// App serving views built from a JSON array of definitions.
    pub fn with_definitions(store: Store, definitions: Value) -> Self {
        let definitions: Vec<mosaic_kernel::aggregate::AggregateDefinition> =
            serde_json::from_value(definitions).expect("definitions should parse");
        let cache = MokaSourceSetCache::default();
        let registry = AggregateRegistry::new();
        let registered = registry.register_definitions(
            &definitions,
            &store,
            Some(std::sync::Arc::new(cache.clone())),
        )
        .expect("every definition should register");
        assert_eq!(registered, definitions.len(), "every definition should register");
        Self::from_registry(store, registry, cache)
    }

    fn from_registry(store: Store, registry: AggregateRegistry, cache: MokaSourceSetCache) -> Self {
        let config = Config {
            site_url: SITE_URL.to_string(),
            ..Config::default()
        };
        let state = AppState::from_parts(&config, store, registry, cache);
        Self {
            router: routes::app(state.clone()),
            state,
        }
    }

    /// Send a request to the app.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// GET a path and return the response.
    pub async fn get(&self, uri: &str) -> Response {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    /// GET a path asking for HTML.
    pub async fn get_html(&self, uri: &str) -> Response {
        self.request(
            Request::get(uri)
                .header(header::ACCEPT, "text/html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Send an empty request with the given method.
    pub async fn send(&self, method: Method, uri: &str) -> Response {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// GET a path, assert 200 and parse the JSON body.
    pub async fn get_json(&self, uri: &str) -> Value {
        let response = self.get(uri).await;
        let status = response.status();
        let body = body_string(response).await;
        assert_eq!(status, StatusCode::OK, "unexpected status for {uri}: {body}");
        serde_json::from_str(&body).expect("response should be JSON")
    }
}

/// Read a response body as a string.
pub async fn body_string(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
}
