use crate::controller::ApiResponse;
use crate::extractors::authenticated_caller::AuthenticatedCaller;
use crate::params::device_flow::{ApproveParams, TokenParams};
use crate::Error;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::device_flow as DeviceFlowApi;
use domain::StartResponse;
use log::*;
use serde::Serialize;
use service::AppState;

/// A started flow plus, when a frontend is configured, the complete URL to visit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartedFlow {
    #[serde(flatten)]
    flow: StartResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_url: Option<String>,
}

/// POST start a new device flow
#[utoipa::path(
    post,
    path = "/device/start",
    responses(
        (status = 200, description = "A device code and user code for a new flow"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn start(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    debug!("POST start device flow");

    let flow = DeviceFlowApi::start(&app_state.device_flows).await?;
    let verification_url = app_state.config.verification_url(&flow.user_code);

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        StartedFlow {
            flow,
            verification_url,
        },
    )))
}

/// POST approve the flow named by a user code
#[utoipa::path(
    post,
    path = "/device/approve",
    request_body = ApproveParams,
    responses(
        (status = 200, description = "The flow's status after the approval attempt"),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Unknown user code or empty access token"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn approve(
    caller: Option<AuthenticatedCaller>,
    State(app_state): State<AppState>,
    Json(params): Json<ApproveParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST approve device flow for user code {}", params.user_code);

    let caller = caller.map(|AuthenticatedCaller(identity)| identity);
    let approved = DeviceFlowApi::approve(
        &app_state.device_flows,
        caller.as_ref(),
        &params.user_code,
        &params.access_token,
        params.access_token_expires_at,
    )
    .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), approved)))
}

/// POST poll a flow for its token
#[utoipa::path(
    post,
    path = "/device/token",
    request_body = TokenParams,
    responses(
        (status = 200, description = "authorization_pending, slow_down, success, expired_token or invalid_grant"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn token(
    State(app_state): State<AppState>,
    params: Option<Json<TokenParams>>,
) -> Result<impl IntoResponse, Error> {
    let Json(params) = params.unwrap_or_default();

    let polled = DeviceFlowApi::poll(&app_state.device_flows, &params.device_code).await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), polled)))
}
