pub(crate) mod apps;
mod authn_middleware;
pub(crate) mod groups;
pub(crate) mod health;
pub(crate) mod hook;
pub(crate) mod users;

use crate::api::authn_middleware::authentication_middleware;
use crate::errors::{ApiError, ServiceError};
use crate::state::AppState;
use axum::{middleware, Router};
use log::{debug, error};

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(protected_routes(state))
}

/// Creates a router for protected routes that require API key authentication
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(hook::router())
        .merge(groups::router())
        .merge(users::router())
        .merge(apps::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
}

/// Log a service failure and turn it into an API error
pub(crate) fn service_error(err: ServiceError) -> ApiError {
    match &err {
        ServiceError::Engine { .. } | ServiceError::Internal { .. } => {
            error!("{} failed: {}", err.operation(), err)
        }
        _ => debug!("{} rejected: {}", err.operation(), err),
    }
    ApiError::from(err)
}
