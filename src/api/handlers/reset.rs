//! Password reset endpoints.
//!
//! Responses never reveal whether an account exists; only blank input and server
//! failures change the shape of a reset request response.

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, error};

use super::ResetState;
use super::types::{
    RequestResetRequest, RequestResetResponse, ResetPasswordRequest, ResetPasswordResponse,
    ResetPasswordWithTokenRequest, VerifyTokenResponse,
};
use crate::reset::{IssueOutcome, ResetError};

const REQUEST_ACCEPTED: &str = "If the email exists, a reset link has been sent.";
const INVALID_LINK: &str = "Invalid or expired reset link";

fn request_reset_response(status: StatusCode, success: bool, message: &str) -> Response {
    (
        status,
        Json(RequestResetResponse {
            success,
            message: message.to_string(),
            token: None,
        }),
    )
        .into_response()
}

/// Public message for a body that could not be read as the expected JSON.
fn rejection_message(rejection: &JsonRejection) -> &'static str {
    debug!("Rejected reset payload: {rejection}");
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "Missing payload",
        _ => "Invalid payload",
    }
}

fn reset_response(status: StatusCode, success: bool, message: &str) -> Response {
    (
        status,
        Json(ResetPasswordResponse {
            success,
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Request a reset link (uniform response whether or not the account exists).
#[utoipa::path(
    post,
    path = "/api/auth/request-reset",
    request_body = RequestResetRequest,
    responses(
        (status = 200, description = "Request accepted", body = RequestResetResponse),
        (status = 400, description = "Missing email", body = RequestResetResponse),
        (status = 500, description = "Server error", body = RequestResetResponse)
    ),
    tag = "reset"
)]
pub async fn request_reset(
    state: Extension<Arc<ResetState>>,
    payload: Result<Json<RequestResetRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request: RequestResetRequest = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return request_reset_response(
                StatusCode::BAD_REQUEST,
                false,
                rejection_message(&rejection),
            );
        }
    };

    if request.email.trim().is_empty() {
        return request_reset_response(StatusCode::BAD_REQUEST, false, "Email required");
    }

    match state.manager().issue(&request.email).await {
        Ok(IssueOutcome::Issued(issued)) => {
            let token = state
                .dev_echo_token()
                .then(|| issued.token.expose_secret().to_string());
            (
                StatusCode::OK,
                Json(RequestResetResponse {
                    success: true,
                    message: REQUEST_ACCEPTED.to_string(),
                    token,
                }),
            )
                .into_response()
        }
        Ok(IssueOutcome::NoSuchUser) => {
            request_reset_response(StatusCode::OK, true, REQUEST_ACCEPTED)
        }
        Err(err) => {
            error!("Failed to issue reset token: {err}");
            request_reset_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Failed to process reset request",
            )
        }
    }
}

/// Check a reset link without consuming it.
#[utoipa::path(
    get,
    path = "/api/auth/reset-password/{token}",
    params(
        ("token" = String, Path, description = "Reset token from the emailed link")
    ),
    responses(
        (status = 200, description = "Token is valid", body = VerifyTokenResponse),
        (status = 400, description = "Invalid or expired token", body = VerifyTokenResponse),
        (status = 500, description = "Server error", body = VerifyTokenResponse)
    ),
    tag = "reset"
)]
pub async fn verify_reset_token(
    state: Extension<Arc<ResetState>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match state.manager().verify(token.trim()).await {
        Ok(verified) => (
            StatusCode::OK,
            Json(VerifyTokenResponse {
                valid: true,
                email: Some(verified.email),
                message: None,
            }),
        )
            .into_response(),
        Err(err) if err.is_client_error() => {
            debug!("Reset token rejected: {err}");
            (
                StatusCode::BAD_REQUEST,
                Json(VerifyTokenResponse {
                    valid: false,
                    email: None,
                    message: Some(INVALID_LINK.to_string()),
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to verify reset token: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(VerifyTokenResponse {
                    valid: false,
                    email: None,
                    message: Some("Failed to verify reset link".to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Set a new password using the token from the path.
#[utoipa::path(
    post,
    path = "/api/auth/reset-password/{token}",
    params(
        ("token" = String, Path, description = "Reset token from the emailed link")
    ),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = ResetPasswordResponse),
        (status = 400, description = "Invalid/expired token or weak password", body = ResetPasswordResponse),
        (status = 500, description = "Server error", body = ResetPasswordResponse)
    ),
    tag = "reset"
)]
pub async fn reset_password(
    state: Extension<Arc<ResetState>>,
    Path(token): Path<String>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return reset_response(StatusCode::BAD_REQUEST, false, rejection_message(&rejection));
        }
    };

    consume(&state, &token, &request.new_password).await
}

/// Set a new password with the token carried in the body.
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordWithTokenRequest,
    responses(
        (status = 200, description = "Password updated", body = ResetPasswordResponse),
        (status = 400, description = "Invalid/expired token or weak password", body = ResetPasswordResponse),
        (status = 500, description = "Server error", body = ResetPasswordResponse)
    ),
    tag = "reset"
)]
pub async fn reset_password_with_body(
    state: Extension<Arc<ResetState>>,
    payload: Result<Json<ResetPasswordWithTokenRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request: ResetPasswordWithTokenRequest = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return reset_response(StatusCode::BAD_REQUEST, false, rejection_message(&rejection));
        }
    };

    consume(&state, &request.token, &request.new_password).await
}

async fn consume(state: &ResetState, token: &str, new_password: &str) -> Response {
    match state.manager().consume(token.trim(), new_password).await {
        Ok(()) => reset_response(StatusCode::OK, true, "Password reset successful"),
        Err(ResetError::WeakPassword(message)) => {
            reset_response(StatusCode::BAD_REQUEST, false, &message)
        }
        Err(err) if err.is_client_error() => {
            debug!("Reset token rejected: {err}");
            reset_response(StatusCode::BAD_REQUEST, false, INVALID_LINK)
        }
        Err(err) => {
            error!("Failed to reset password: {err}");
            reset_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Password reset failed",
            )
        }
    }
}
