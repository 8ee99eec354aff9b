//! API route definitions

use super::{handlers, snippets, users};
use crate::auth::{self, Authenticator};
use crate::config::SnippetDefaults;
use crate::pagination::Paginator;
use crate::router::{ResourceRouter, RouterError};
use crate::store::{SnippetStore, UserStore};
use crate::viewset::ReadOnlyModelViewSet;
use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub snippets: Arc<SnippetStore>,
    pub users: Arc<UserStore>,
    pub authenticator: Arc<Authenticator>,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub page_size: usize,
    pub snippet_defaults: SnippetDefaults,
}

/// Build the resource routes for `snippets` and `users`
pub fn resource_router(state: &AppState) -> Result<ResourceRouter, RouterError> {
    let paginator = Paginator::new(state.page_size);

    let snippet_resource = Arc::new(snippets::SnippetResource::new(
        state.snippets.clone(),
        state.users.clone(),
        state.snippet_defaults.clone(),
    ));
    let user_resource = Arc::new(users::UserResource::new(
        state.users.clone(),
        state.snippets.clone(),
    ));

    let mut router = ResourceRouter::new();
    router
        .register("snippets", snippets::viewset(snippet_resource, paginator)?)?
        .register(
            "users",
            ReadOnlyModelViewSet::new("user", user_resource, paginator),
        )?
        .mount(
            "api-auth",
            auth::routes::auth_router(state.authenticator.clone()),
            &auth::routes::AUTH_PATHS,
        )?;

    Ok(router)
}

/// Create the main API router
pub fn create_router(state: AppState) -> Result<Router, RouterError> {
    let api = resource_router(&state)?
        .into_router()
        .layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            auth::auth_middleware,
        ));

    Ok(Router::new()
        // Health and status
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        ))
}
