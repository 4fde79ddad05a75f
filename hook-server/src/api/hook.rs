use crate::errors::ApiError;
use crate::models::hook::{TokenHookRequest, TokenHookResponse};
use crate::openapi::HOOK_TAG;
use crate::services::Decision;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use http::StatusCode;
use log::warn;

#[utoipa::path(
    post,
    path = "/api/v0/hook/token",
    tag = HOOK_TAG,
    request_body = TokenHookRequest,
    params(
        ("Authorization" = String, Header, description = "Authorization header"),
    ),
    responses(
        (status = 200, description = "Token allowed, claims to add to the session", body = TokenHookResponse),
        (status = 403, description = "Token denied"),
        (status = 422, description = "Invalid request payload")
    )
)]
pub(crate) async fn token_hook_handler(
    State(state): State<AppState>,
    payload: Result<Json<TokenHookRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected token hook payload: {}", rejection.body_text());
            return ApiError::new(rejection.body_text(), StatusCode::UNPROCESSABLE_ENTITY)
                .into_response();
        }
    };

    match state.pipeline.decide(&request).await {
        Decision::Allow { groups } => {
            (StatusCode::OK, Json(TokenHookResponse::with_groups(groups))).into_response()
        }
        // No detail is returned to the token issuer.
        Decision::Deny => StatusCode::FORBIDDEN.into_response(),
    }
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/api/v0/hook/token", post(token_hook_handler))
}
