use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use application::CreateMessageRequest;
use domain::{ChatMessage, MessageId};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct CreateMessagePayload {
    sender: String,
    message: String,
}

pub fn router(state: AppState) -> Router {
    let chat_routes = Router::new()
        .route("/messages", get(list_messages).post(create_message))
        .route("/messages/{id}", get(get_message))
        .layer(TimeoutLayer::new(state.request_timeout));

    Router::new()
        .route("/health", get(health))
        .route("/chathub", get(chat_hub))
        .nest("/chat", chat_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_message(
    State(state): State<AppState>,
    Json(payload): Json<CreateMessagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let message = state
        .chat_service
        .create_message(
            CreateMessageRequest {
                sender: payload.sender,
                message: payload.message,
            },
            &cancel,
        )
        .await?;

    let location = format!("/chat/messages/{}", message.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(message),
    ))
}

async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let messages = state.chat_service.list_messages(&cancel).await?;
    Ok(Json(messages))
}

async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<ChatMessage>, ApiError> {
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    state
        .chat_service
        .find_message(id, &cancel)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "MESSAGE_NOT_FOUND", "message not found"))
}

async fn chat_hub(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state).run())
}
