use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 已验证的用户身份。
///
/// 由身份解析器产出，对消息组件只读。`device_token` 为推送网关的设备令牌。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)] // 设备令牌不暴露给客户端
    pub device_token: Option<String>,
}

impl Identity {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            display_name: None,
            device_token: None,
        }
    }

    pub fn with_device_token(mut self, token: impl Into<String>) -> Self {
        self.device_token = Some(token.into());
        self
    }

    /// 返回可用于推送的设备令牌，空白令牌视为未注册
    pub fn push_token(&self) -> Option<&str> {
        self.device_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}
