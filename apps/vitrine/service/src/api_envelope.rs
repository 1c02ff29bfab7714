use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

pub type ApiErrorTuple = (StatusCode, Json<ApiErrorResponse>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    InvalidRequest,
    Unauthorized,
    NotFound,
    Conflict,
    DomainNotConfigured,
    ProviderFailed,
    ServiceUnavailable,
}

impl ApiErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::DomainNotConfigured => "domain_not_configured",
            Self::ProviderFailed => "provider_failed",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }

    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::DomainNotConfigured => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProviderFailed => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub message: String,
    pub error: ApiErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Serialize)]
pub struct ApiDataEnvelope<T> {
    pub data: T,
}

pub fn ok_data<T: Serialize>(data: T) -> (StatusCode, Json<ApiDataEnvelope<T>>) {
    (StatusCode::OK, Json(ApiDataEnvelope { data }))
}

pub fn error_response(code: ApiErrorCode, message: impl Into<String>) -> ApiErrorTuple {
    error_response_with_status(code.default_status(), code, message)
}

pub fn error_response_with_status(
    status: StatusCode,
    code: ApiErrorCode,
    message: impl Into<String>,
) -> ApiErrorTuple {
    error_response_with_fields(status, code, message, None)
}

pub fn error_response_with_fields(
    status: StatusCode,
    code: ApiErrorCode,
    message: impl Into<String>,
    errors: Option<HashMap<String, Vec<String>>>,
) -> ApiErrorTuple {
    let message = message.into();
    (
        status,
        Json(ApiErrorResponse {
            message: message.clone(),
            error: ApiErrorDetail {
                code: code.as_str(),
                message,
            },
            errors,
        }),
    )
}

pub fn validation_error(field: &'static str, message: &str) -> ApiErrorTuple {
    let mut errors = HashMap::new();
    errors.insert(field.to_string(), vec![message.to_string()]);

    error_response_with_fields(
        StatusCode::UNPROCESSABLE_ENTITY,
        ApiErrorCode::InvalidRequest,
        message.to_string(),
        Some(errors),
    )
}

pub fn unauthorized_error(message: &str) -> ApiErrorTuple {
    error_response(ApiErrorCode::Unauthorized, message.to_string())
}

pub fn not_found_error(message: impl Into<String>) -> ApiErrorTuple {
    error_response_with_status(StatusCode::NOT_FOUND, ApiErrorCode::NotFound, message)
}
