use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use application::{DirectMessageDto, RoomMessageDto};
use domain::{RoomId, UserId};

use crate::{
    auth::AuthUser,
    error::ApiError,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
    ws_connection::websocket_upgrade,
};

#[derive(Debug, Deserialize)]
struct ContentPayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct DeviceTokenPayload {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationQuery {
    #[serde(rename = "userA")]
    user_a: i64,
    #[serde(rename = "userB")]
    user_b: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/rooms/{room_id}/messages",
            post(send_room_message).get(get_room_messages),
        )
        .route("/dm/conversation", get(get_conversation))
        .route("/dm/{recipient_id}", post(send_direct_message))
        .route("/devices/token", put(register_device_token))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_room_messages(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    ApiPath(room_id): ApiPath<i64>,
) -> Result<Json<Vec<RoomMessageDto>>, ApiError> {
    let messages = state
        .room_messaging
        .get_messages_for_room(RoomId(room_id))
        .await?;

    Ok(Json(messages.iter().map(RoomMessageDto::from).collect()))
}

async fn send_room_message(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(room_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<ContentPayload>,
) -> Result<(StatusCode, Json<RoomMessageDto>), ApiError> {
    let message = state
        .room_messaging
        .send_to_room(RoomId(room_id), caller.id, payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(RoomMessageDto::from(&message))))
}

async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiQuery(query): ApiQuery<ConversationQuery>,
) -> Result<Json<Vec<DirectMessageDto>>, ApiError> {
    let messages = state
        .direct_messaging
        .get_conversation_for(caller.id, UserId(query.user_a), UserId(query.user_b))
        .await?;
    Ok(Json(messages.iter().map(DirectMessageDto::from).collect()))
}

async fn send_direct_message(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(recipient_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<ContentPayload>,
) -> Result<(StatusCode, Json<DirectMessageDto>), ApiError> {
    let message = state
        .direct_messaging
        .send(caller.id, UserId(recipient_id), payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(DirectMessageDto::from(&message))))
}

async fn register_device_token(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(payload): ApiJson<DeviceTokenPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .direct_messaging
        .register_device_token(caller.id, payload.token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use config::AppConfig;
    use infrastructure::{InMemoryStorage, Infrastructure, LoggingNotificationDispatcher, TokenIssuer};
    use tower::util::ServiceExt;

    use super::*;

    async fn app_with_alice() -> (Router, String) {
        let config = AppConfig::default();
        let storage = Arc::new(InMemoryStorage::new());
        storage.insert_identity("alice").await;
        let infra = Infrastructure::in_memory(storage, Arc::new(LoggingNotificationDispatcher));
        let token = TokenIssuer::new(&config.jwt)
            .issue("alice")
            .expect("Failed to issue token");
        (router(AppState::new(infra, &config)), token)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = app_with_alice().await;

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to execute request");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_bearer_token() {
        let (app, _) = app_with_alice().await;

        let request = Request::builder()
            .uri("/api/v1/rooms/1/messages")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to execute request");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    async fn error_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        serde_json::from_slice(&bytes).expect("error body should be JSON")
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_body() {
        let (app, token) = app_with_alice().await;
        let auth = format!("Bearer {token}");

        let requests = [
            Request::builder()
                .method("POST")
                .uri("/api/v1/rooms/1/messages")
                .header(header::AUTHORIZATION, &auth)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"text": "hello"}"#)),
            Request::builder()
                .uri("/api/v1/rooms/general/messages")
                .header(header::AUTHORIZATION, &auth)
                .body(Body::empty()),
            Request::builder()
                .uri("/api/v1/dm/conversation?userA=abc&userB=1")
                .header(header::AUTHORIZATION, &auth)
                .body(Body::empty()),
            Request::builder()
                .method("PUT")
                .uri("/api/v1/devices/token")
                .header(header::AUTHORIZATION, &auth)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not json")),
        ];

        for request in requests {
            let request = request.expect("Failed to build request");
            let uri = request.uri().clone();
            let response = app
                .clone()
                .oneshot(request)
                .await
                .expect("Failed to execute request");

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = error_body(response).await;
            assert_eq!(body["code"], "INVALID_ARGUMENT", "{uri}");
            assert!(body["message"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unknown_room_history_is_not_found() {
        let (app, token) = app_with_alice().await;

        let request = Request::builder()
            .uri("/api/v1/rooms/42/messages")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to execute request");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
