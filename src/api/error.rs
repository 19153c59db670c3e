use crate::bootstrap::{BootstrapError, error_script};
use crate::provisioning::ProvisioningError;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::error;

impl IntoResponse for ProvisioningError {
    fn into_response(self) -> Response {
        match self {
            ProvisioningError::Validation(reason) => (StatusCode::BAD_REQUEST, format!("Bad Request: {}", reason)).into_response(),
            ProvisioningError::Unauthorized(reason) => (StatusCode::FORBIDDEN, format!("Unauthorized: {}", reason)).into_response(),
            ProvisioningError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                "Too many requests. Please wait before retrying.",
            )
                .into_response(),
            ProvisioningError::NotFound(_) => (StatusCode::NOT_FOUND, "Device not found.").into_response(),
            ProvisioningError::Config(_) | ProvisioningError::Upstream { .. } | ProvisioningError::Store(_) => {
                error!("❌ Request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

impl From<JsonRejection> for ProvisioningError {
    fn from(rejection: JsonRejection) -> Self {
        ProvisioningError::Validation(rejection.body_text())
    }
}

/// Bootstrap failures past tag validation answer with a script, so the device prints the reason.
pub fn bootstrap_failure(tag: &str, error: BootstrapError) -> Response {
    let (status, reason) = match &error {
        BootstrapError::MissingTag => {
            return (
                StatusCode::BAD_REQUEST,
                "Bad Request: A 'tag' query parameter is required. Example: ?tag=carrington-leak-detection",
            )
                .into_response();
        }
        BootstrapError::InvalidTag(_) => return (StatusCode::BAD_REQUEST, format!("Bad Request: {}", error)).into_response(),
        BootstrapError::NotFound(_) => (StatusCode::NOT_FOUND, "Script tag not found."),
        BootstrapError::Empty(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Script content is empty or missing."),
        BootstrapError::Io { .. } => {
            error!("❌ Bootstrap request failed: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred.")
        }
    };

    (status, [(header::CONTENT_TYPE, "text/plain")], error_script(tag, reason, Utc::now())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceId;
    use rstest::rstest;

    #[rstest]
    #[case(ProvisioningError::Validation("bad".to_string()), StatusCode::BAD_REQUEST)]
    #[case(ProvisioningError::Unauthorized("no".to_string()), StatusCode::FORBIDDEN)]
    #[case(ProvisioningError::RateLimited { retry_after_secs: 5 }, StatusCode::TOO_MANY_REQUESTS)]
    #[case(ProvisioningError::NotFound(DeviceId::from("device-1")), StatusCode::NOT_FOUND)]
    #[case(ProvisioningError::Config("no key".to_string()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ProvisioningError::Upstream { status: Some(502), body: "tskey-api-leak".to_string() }, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ProvisioningError::Store("down".to_string()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn errors_map_to_status_codes(#[case] error: ProvisioningError, #[case] expected: StatusCode) {
        assert_eq!(error.into_response().status(), expected);
    }

    #[rstest]
    #[case(BootstrapError::MissingTag, StatusCode::BAD_REQUEST)]
    #[case(BootstrapError::InvalidTag("a b".to_string()), StatusCode::BAD_REQUEST)]
    #[case(BootstrapError::NotFound("t".to_string()), StatusCode::NOT_FOUND)]
    #[case(BootstrapError::Empty("t".to_string()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn bootstrap_failures_map_to_status_codes(#[case] error: BootstrapError, #[case] expected: StatusCode) {
        assert_eq!(bootstrap_failure("t", error).status(), expected);
    }

    #[test]
    fn rate_limited_responses_carry_retry_after() {
        let response = ProvisioningError::RateLimited { retry_after_secs: 42 }.into_response();

        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
