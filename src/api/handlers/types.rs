//! Request/response types for reset endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RequestResetRequest {
    #[serde(default)]
    pub email: String,
}

/// Uniform response for reset requests; identical for known and unknown emails.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RequestResetResponse {
    pub success: bool,
    pub message: String,
    /// Only present when the development token echo is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(alias = "password", default)]
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordWithTokenRequest {
    #[serde(default)]
    pub token: String,
    #[serde(alias = "password", default)]
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordResponse {
    pub success: bool,
    pub message: String,
}

impl std::fmt::Debug for ResetPasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetPasswordRequest")
            .field("new_password", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Debug for ResetPasswordWithTokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetPasswordWithTokenRequest")
            .field("token", &"[REDACTED]")
            .field("new_password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn reset_password_accepts_camel_case_and_alias() -> Result<()> {
        let camel: ResetPasswordRequest = serde_json::from_str(r#"{"newPassword":"NewPass123"}"#)?;
        assert_eq!(camel.new_password, "NewPass123");

        let alias: ResetPasswordWithTokenRequest =
            serde_json::from_str(r#"{"token":"abc","password":"NewPass123"}"#)?;
        assert_eq!(alias.token, "abc");
        assert_eq!(alias.new_password, "NewPass123");
        Ok(())
    }

    #[test]
    fn request_reset_response_omits_token_by_default() -> Result<()> {
        let body = serde_json::to_value(RequestResetResponse {
            success: true,
            message: "ok".to_string(),
            token: None,
        })?;
        assert!(body.get("token").is_none());
        Ok(())
    }

    #[test]
    fn password_requests_redact_debug() {
        let request = ResetPasswordWithTokenRequest {
            token: "abc".to_string(),
            new_password: "NewPass123".to_string(),
        };
        let debug = format!("{request:?}");
        assert!(!debug.contains("NewPass123"));
        assert!(!debug.contains("abc"));
    }
}
