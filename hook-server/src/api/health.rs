use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::warn;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Basic health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    status: &'static str,
    details: Option<Value>,
    #[serde(skip)]
    status_code: StatusCode,
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "status": self.status
        });

        if let Some(Value::Object(obj)) = self.details {
            for (key, value) in obj {
                body[key] = value;
            }
        }

        (self.status_code, Json(body)).into_response()
    }
}

fn component_status(result: &Result<(), String>) -> Value {
    match result {
        Ok(()) => Value::from("healthy"),
        Err(err) => Value::from(err.as_str()),
    }
}

/// Liveness check handler
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is alive", body = Health)
    )
)]
pub(crate) async fn health_check() -> impl IntoResponse {
    Health {
        status: "ok",
        details: None,
        status_code: StatusCode::OK,
    }
}

/// Readiness check handler, verifies the store and the authorization engine
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = Health),
        (status = 503, description = "Service is not ready", body = Health)
    )
)]
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let (store, engine) = state.health_check().await;
    let details = serde_json::json!({
        "store_status": component_status(&store),
        "engine_status": component_status(&engine),
    });

    if store.is_ok() && engine.is_ok() {
        Health {
            status: "ok",
            details: Some(details),
            status_code: StatusCode::OK,
        }
    } else {
        warn!("Readiness check failed: {}", details);
        Health {
            status: "error",
            details: Some(details),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}

#[cfg(test)]
mod test {
    use crate::test_utils::TestFixture;
    use axum::body::Body;
    use http::{Method, Request, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_health_endpoint_needs_no_api_key() {
        let fixture = TestFixture::new().await;
        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Body::empty())
            .expect("Failed to build request");

        let response = fixture.send(request).await;
        response.assert_ok();
        assert_eq!(response.json, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_ready_endpoint() {
        let fixture = TestFixture::new().await;
        fixture
            .add_engine_mock(Method::GET, "/healthz", json!({ "status": "SERVING" }), StatusCode::OK, 1)
            .await;

        let response = fixture.get("/ready").await;
        response.assert_ok();
        assert_eq!(
            response.json,
            json!({
                "status": "ok",
                "store_status": "healthy",
                "engine_status": "healthy",
            })
        );
    }

    #[tokio::test]
    async fn test_ready_endpoint_engine_down() {
        let fixture = TestFixture::new().await;
        fixture
            .add_engine_mock(
                Method::GET,
                "/healthz",
                json!({}),
                StatusCode::SERVICE_UNAVAILABLE,
                1,
            )
            .await;

        let response = fixture.get("/ready").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json["status"], "error");
        assert_eq!(response.json["store_status"], "healthy");
    }
}
