//! 统一的 API 错误类型与转换。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::StoreError;

pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::InvalidPayload(_) | StoreError::InvalidSubDirectory => {
                ApiError::BadRequest(error.to_string())
            }
            StoreError::SourceRead(_)
            | StoreError::CreateDir(_)
            | StoreError::Write(_)
            | StoreError::PathResolution(_) => ApiError::Internal(error.to_string()),
        }
    }
}
