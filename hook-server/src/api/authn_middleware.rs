use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;

const FORBIDDEN_MESSAGE: &str =
    "You are not authorized to access this resource, please check your API key.";

pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Extract the authorization header
    let Some(auth_header) = request.headers().get(http::header::AUTHORIZATION) else {
        warn!("Missing Authorization header");
        return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
    };

    // Extract the token from the authorization header
    let api_key = match auth_header.to_str() {
        Ok(header_str) if header_str.to_lowercase().starts_with("bearer ") => {
            // Remove the "Bearer " prefix
            header_str[7..].to_string()
        }
        Ok(_) => {
            warn!("Invalid Authorization header format, missing 'Bearer ' prefix");
            return (StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE).into_response();
        }
        Err(e) => {
            warn!("Failed to parse Authorization header to string: {}", e);
            return (StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE).into_response();
        }
    };

    // Verify the API key
    if state.config.api_key.is_empty() || api_key != state.config.api_key {
        warn!("Authentication failed: Invalid API key");
        return (StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE).into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wiremock::MockServer;

    const TEST_ROUTE: &str = "/test";

    /// Helper function to set up a mock app with authentication middleware
    async fn setup_authn_mock_app(api_key: &str) -> Router {
        let engine_mock = MockServer::start().await;
        let feed_mock = MockServer::start().await;
        let mut config = AppConfig::for_test_with_mocks(&engine_mock, &feed_mock);
        config.api_key = api_key.to_string();
        let state = AppState::for_testing(&config);

        Router::new()
            .route(TEST_ROUTE, get(async || (StatusCode::OK, "Authenticated")))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                authentication_middleware,
            ))
            .with_state(state)
    }

    /// Helper function to build a request with optional authorization header
    async fn send_request(app: &Router, auth_header: Option<&str>) -> (StatusCode, String) {
        let mut request_builder = Request::builder().uri(TEST_ROUTE);

        if let Some(auth) = auth_header {
            request_builder = request_builder.header("Authorization", auth);
        }

        let request = request_builder
            .body(Body::empty())
            .expect("Failed to build request");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let body = String::from_utf8(body_bytes.to_vec())
            .expect("Failed to convert response body to string");

        (status, body)
    }

    #[tokio::test]
    async fn test_authentication_middleware() {
        let app = setup_authn_mock_app("test_api_key").await;
        let (status, body) = send_request(&app, Some("Bearer test_api_key")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Authenticated");
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let app = setup_authn_mock_app("test_api_key").await;
        let (status, body) = send_request(&app, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Missing Authorization header");
    }

    #[tokio::test]
    async fn test_invalid_authorization_format() {
        let app = setup_authn_mock_app("test_api_key").await;
        let (status, body) = send_request(&app, Some("test_api_key")).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, FORBIDDEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_invalid_api_key() {
        let app = setup_authn_mock_app("test_api_key").await;
        let (status, _) = send_request(&app, Some("Bearer wrong_api_key")).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unset_api_key_rejects_everything() {
        let app = setup_authn_mock_app("").await;
        let (status, _) = send_request(&app, Some("Bearer ")).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
