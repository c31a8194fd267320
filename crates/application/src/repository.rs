use async_trait::async_trait;
use domain::{
    DirectMessage, Identity, NewDirectMessage, NewRoomMessage, RepositoryError, Room, RoomId,
    RoomMessage, UserId,
};

/// 身份查询。用户的注册与维护不属于消息核心，这里只读（设备令牌除外）。
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError>;
    // 传入 None 表示清除设备令牌
    async fn update_device_token(
        &self,
        id: UserId,
        token: Option<String>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;
}

/// 消息存储：房间消息与私信的持久化接口
#[async_trait]
pub trait MessageStore: Send + Sync {
    // 保存房间消息，返回带存储分配 id 的完整记录
    async fn create_room_message(
        &self,
        message: NewRoomMessage,
    ) -> Result<RoomMessage, RepositoryError>;

    // 房间全部消息，按 (created_at, id) 升序
    async fn list_room_messages(&self, room_id: RoomId)
        -> Result<Vec<RoomMessage>, RepositoryError>;

    async fn create_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<DirectMessage, RepositoryError>;

    // a 与 b 之间双向的全部私信，按 (created_at, id) 升序
    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<DirectMessage>, RepositoryError>;
}
