//! 请求认证
//!
//! 每个同步入口都通过与握手相同的身份解析器校验 bearer 凭证。

use application::bearer_token;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use domain::Identity;
use tracing::warn;

use crate::{error::ApiError, state::AppState};

/// 已认证的调用者
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

/// 从 `Authorization: Bearer <token>` 中取出凭证
pub(crate) fn credential_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(bearer_token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = credential_from_headers(&parts.headers);
        match state.gatekeeper.authenticate(credential).await {
            Ok(identity) => Ok(AuthUser(identity)),
            Err(err) => {
                warn!(path = %parts.uri.path(), error = %err, "request rejected");
                Err(err.into())
            }
        }
    }
}
