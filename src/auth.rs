//! 认证中间件占位：当前直接放行，保留接入点。

use axum::body::Body as AxumBody;
use axum::http::Request;
use axum::{middleware, response::Response};

use crate::error::ApiError;

/// 认证中间件。
// TODO: 接入会话或 token 校验后再启用拦截
pub async fn auth_middleware(
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    Ok(next.run(req).await)
}
