//! HTTP surface.
//!
//! ```text
//! PUT    /templates/{name}         store a template (body = source)
//! GET    /templates/{name}         fetch the stored source
//! DELETE /templates/{name}         remove a template
//! GET    /templates/{name}/apply   render with query-string parameters
//! GET    /health                   liveness
//! ```

pub mod error;
pub mod middleware;
mod templates;

use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::get,
};

use crate::{
    application::ArtifactService,
    store::{CallContext, ObjectStoreArtifactStore},
};

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub templates: ArtifactService<ObjectStoreArtifactStore>,
    /// Deadline applied to the storage calls made for one request.
    pub request_timeout: Duration,
}

impl HttpState {
    pub fn new(templates: ArtifactService<ObjectStoreArtifactStore>, request_timeout: Duration) -> Self {
        Self {
            templates,
            request_timeout,
        }
    }

    fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}

pub fn build_router(state: HttpState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            "/templates/{name}",
            get(templates::get_template)
                .put(templates::put_template)
                .delete(templates::delete_template),
        )
        .route("/templates/{name}/apply", get(templates::apply_template))
        .route("/health", get(templates::health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
