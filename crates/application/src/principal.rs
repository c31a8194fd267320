use async_trait::async_trait;
use domain::Identity;

use crate::error::ApplicationError;

/// 身份解析器：把不透明的 bearer 凭证解析为已验证的身份。
///
/// 凭证格式错误、签名无效、已过期或对应用户不存在，一律返回
/// [`ApplicationError::Unauthenticated`]，调用方无法区分具体原因。
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Identity, ApplicationError>;
}
