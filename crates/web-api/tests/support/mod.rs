#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{NotificationDispatcher, NotificationError};
use config::AppConfig;
use futures_util::StreamExt;
use infrastructure::{InMemoryStorage, Infrastructure, TokenIssuer};
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message as TungsteniteMessage},
    MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 记录每一次推送调用
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn send_to_token(
        &self,
        token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        self.calls
            .lock()
            .unwrap()
            .push((token.to_owned(), title.to_owned(), body.to_owned()));
        Ok(())
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub storage: Arc<InMemoryStorage>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
    issuer: TokenIssuer,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let mut config = AppConfig::default();
        config.database.in_memory = true;
        config.broker.delivery_timeout_ms = 100;

        let storage = Arc::new(InMemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let infra = Infrastructure::in_memory(storage.clone(), notifier.clone());
        let state = AppState::new(infra, &config);
        let issuer = TokenIssuer::new(&config.jwt);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            storage,
            notifier,
            state,
            issuer,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn token(&self, username: &str) -> String {
        self.issuer.issue(username).expect("issue token")
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// 携带 `Authorization` 头建立连接，并读掉欢迎帧
    pub async fn connect(&self, token: &str) -> (WsStream, Value) {
        let mut request = self.ws_url().into_client_request().expect("request");
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        let (mut ws, _) = connect_async(request).await.expect("ws connect");
        let welcome = next_json(&mut ws).await;
        assert_eq!(welcome["type"], "welcome");
        (ws, welcome)
    }

    /// 等待会话数量达到预期，注销发生在连接任务结束之后
    pub async fn wait_for_sessions(&self, expected: usize) {
        for _ in 0..50 {
            if self.state.broker.registry().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {expected} sessions, found {}",
            self.state.broker.registry().len()
        );
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 读取下一个文本帧并解析为 JSON，跳过控制帧
pub async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        match message {
            TungsteniteMessage::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("json frame")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected message {other:?}"),
        }
    }
}

pub fn text(value: Value) -> TungsteniteMessage {
    TungsteniteMessage::Text(value.to_string().into())
}
