use application::{
    AdmittedSession, Delivery, EventPayload, IdentityDto, InboundDestination, SessionGuard, Topic,
};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
};
use domain::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    auth::credential_from_headers, error::ApiError, extract::ApiQuery, state::AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    /// 浏览器无法设置握手头时的备用凭证
    access_token: Option<String>,
}

/// 握手：先认证并注册会话，再升级连接。认证失败直接返回 401，不创建会话。
pub(crate) async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let credential = credential_from_headers(&headers).or(query.access_token.as_deref());

    let admitted = state.gatekeeper.admit(credential).await.map_err(|err| {
        tracing::warn!(error = %err, "WebSocket 握手被拒绝");
        ApiError::from(err)
    })?;

    // 升级未完成时闭包被丢弃，会话守卫随之注销会话
    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, admitted).run()))
}

/// 客户端帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientFrame {
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
    Send {
        destination: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    Ping,
}

/// 服务端帧
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerFrame<'a> {
    Welcome {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        user: IdentityDto,
    },
    Subscribed {
        topic: Topic,
    },
    Unsubscribed {
        topic: Topic,
    },
    Event {
        topic: &'a Topic,
        payload: &'a EventPayload,
    },
    Error {
        code: &'static str,
        message: String,
    },
    Pong,
}

impl ServerFrame<'_> {
    fn to_text(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket frame");
                None
            }
        }
    }
}

impl From<ApiError> for ServerFrame<'static> {
    fn from(error: ApiError) -> Self {
        ServerFrame::Error {
            code: error.code(),
            message: error.message().to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    content: String,
}

/// WebSocket 连接
///
/// 持有已通过认证的会话，负责：
/// - 出站事件转发
/// - 入站帧分发到用例服务
/// - 心跳
///
/// 连接结束时会话守卫被丢弃，注册表中的会话和订阅一并移除。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    session: AdmittedSession,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, session: AdmittedSession) -> Self {
        Self {
            socket,
            state,
            session,
        }
    }

    pub async fn run(self) {
        let Self {
            socket,
            state,
            session,
        } = self;
        let AdmittedSession {
            guard,
            mut outbound,
        } = session;

        let connection_id = guard.connection_id();
        let user_id = guard.identity().id;
        tracing::info!(connection_id = %connection_id, user_id = %user_id, "WebSocket 连接已建立");

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let welcome = ServerFrame::Welcome {
            connection_id,
            user: IdentityDto::from(guard.identity()),
        };
        if let Some(text) = welcome.to_text() {
            // 通道刚创建，容量足够
            let _ = cmd_tx.try_send(WsCommand::SendText(text));
        }

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let text = tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(WsCommand::SendText(text)) => WsMessage::Text(text.into()),
                        Some(WsCommand::SendPong(data)) => WsMessage::Pong(data.into()),
                        None => break,
                    },
                    delivery = outbound.recv() => match delivery {
                        Some(delivery) => match event_frame(&delivery) {
                            Some(text) => WsMessage::Text(text.into()),
                            None => continue,
                        },
                        None => break,
                    },
                };
                if sender.send(text).await.is_err() {
                    tracing::warn!("Failed to send websocket message");
                    break;
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收任务：处理来自客户端的帧
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if handle_incoming(message, &state, &guard, &cmd_tx).await.is_err() {
                    break;
                }
            }
            tracing::debug!("WebSocket接收任务结束");
            // guard 在这里被丢弃
        });

        // 任意一个任务结束即视为断开，另一个随之取消
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        tracing::info!(connection_id = %connection_id, user_id = %user_id, "WebSocket连接已断开");
    }
}

fn event_frame(delivery: &Delivery) -> Option<String> {
    ServerFrame::Event {
        topic: &delivery.topic,
        payload: &delivery.payload,
    }
    .to_text()
}

/// 处理来自客户端的消息，返回 `Err` 表示连接应当结束
async fn handle_incoming(
    message: WsMessage,
    state: &AppState,
    guard: &SessionGuard,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> Result<(), ()> {
    let reply = match message {
        WsMessage::Close(_) => {
            tracing::info!(connection_id = %guard.connection_id(), "WebSocket收到关闭消息");
            return Err(());
        }
        WsMessage::Ping(data) => {
            return cmd_tx
                .send(WsCommand::SendPong(data.to_vec()))
                .await
                .map_err(|_| ());
        }
        WsMessage::Pong(_) => return Ok(()),
        WsMessage::Binary(_) => Some(ServerFrame::from(ApiError::bad_request(
            "UNSUPPORTED_FRAME",
            "binary frames are not supported",
        ))),
        WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(frame) => match handle_frame(frame, state, guard).await {
                Ok(reply) => reply,
                Err(err) => Some(ServerFrame::from(err)),
            },
            Err(err) => Some(ServerFrame::from(ApiError::bad_request(
                "INVALID_FRAME",
                err.to_string(),
            ))),
        },
    };

    if let Some(text) = reply.as_ref().and_then(|frame| frame.to_text()) {
        cmd_tx.send(WsCommand::SendText(text)).await.map_err(|_| ())?;
    }
    Ok(())
}

/// 入站帧分发。动作身份始终取自会话，从不取自客户端负载。
async fn handle_frame(
    frame: ClientFrame,
    state: &AppState,
    guard: &SessionGuard,
) -> Result<Option<ServerFrame<'static>>, ApiError> {
    let identity = guard.identity();
    tracing::debug!(connection_id = %guard.connection_id(), frame = ?frame, "收到客户端帧");

    match frame {
        ClientFrame::Ping => Ok(Some(ServerFrame::Pong)),
        ClientFrame::Subscribe { topic } => {
            let topic = Topic::parse(&topic)?;
            guard
                .subscribe(topic.clone())
                .map_err(application::ApplicationError::from)?;
            Ok(Some(ServerFrame::Subscribed { topic }))
        }
        ClientFrame::Unsubscribe { topic } => {
            let topic = Topic::parse(&topic)?;
            guard.unsubscribe(&topic);
            Ok(Some(ServerFrame::Unsubscribed { topic }))
        }
        ClientFrame::Send {
            destination,
            payload,
        } => {
            match destination.parse::<InboundDestination>()? {
                InboundDestination::Chat(room_id) => {
                    let content = content_of(payload)?;
                    state
                        .room_messaging
                        .send_to_room(room_id, identity.id, content)
                        .await?;
                }
                InboundDestination::Direct(recipient_id) => {
                    let content = content_of(payload)?;
                    state
                        .direct_messaging
                        .send(identity.id, recipient_id, content)
                        .await?;
                }
                InboundDestination::TypingInRoom(room_id) => {
                    state.typing.notify_typing(&identity.username, room_id).await;
                }
                InboundDestination::TypingToUser(target) => {
                    state
                        .typing
                        .notify_typing_user(&identity.username, &target)
                        .await;
                }
            }
            Ok(None)
        }
    }
}

fn content_of(payload: serde_json::Value) -> Result<String, ApiError> {
    serde_json::from_value::<ContentPayload>(payload)
        .map(|payload| payload.content)
        .map_err(|err| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_PAYLOAD",
                format!("payload must be {{\"content\": string}}: {err}"),
            )
        })
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}
