use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use socketioxide::{
    SocketIo,
    extract::{AckSender, Data, Extension, SocketRef},
    handler::ConnectHandler,
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    error::AppError,
    socket::{
        ack::{ack_error, ack_ok},
        auth::SocketAuthMiddleware,
        registry::ConnectionSink,
        rooms::ChannelName,
        types::SocketUserContext,
    },
    state::AppState,
};

pub(crate) fn register_namespace(io: &SocketIo, state: AppState) {
    let middleware = SocketAuthMiddleware::new(state);
    let _ = io.ns("/", on_connect.with(middleware));
}

/// Delivery edge over a live socket. Emits are synchronous fire-and-forget;
/// a full send buffer surfaces as a skipped delivery, never a stall.
struct SocketSink {
    socket: SocketRef,
}

impl ConnectionSink for SocketSink {
    fn deliver(&self, event: &str, payload: &JsonValue) -> anyhow::Result<()> {
        self.socket
            .emit(event.to_string(), payload)
            .map_err(|err| anyhow::anyhow!("socket emit failed: {err}"))
    }
}

async fn on_connect(socket: SocketRef) {
    let (Some(state), Some(user)) = (
        socket.extensions.get::<AppState>(),
        socket.extensions.get::<SocketUserContext>(),
    ) else {
        // The auth middleware always installs both; an admitted socket
        // without them is unusable.
        warn!(socket_id = %socket.id, "socket admitted without identity, disconnecting");
        socket.disconnect().ok();
        return;
    };

    let sink = Arc::new(SocketSink {
        socket: socket.clone(),
    });
    state
        .registry
        .register(&socket.id.to_string(), &user.user_id, sink);
    info!(socket_id = %socket.id, user_id = %user.user_id, "socket connected");

    socket.on("join-room", handle_join_room);
    socket.on("leave-room", handle_leave_room);
    socket.on("chat-send", handle_chat_send);
    socket.on("typing-start", handle_typing_start);
    socket.on("typing-stop", handle_typing_stop);
    socket.on("view-document", handle_view_document);
    socket.on("document-comment", handle_document_comment);

    socket.on_disconnect(handle_disconnect);
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomAck {
    success: bool,
}

fn ack_success(ack: AckSender) {
    ack_ok(ack, RoomAck { success: true });
}

async fn handle_join_room(
    socket: SocketRef,
    Data(room_id): Data<String>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(state): Extension<AppState>,
) {
    let span = info_span!(
        "socket join-room",
        socket_id = %socket.id,
        user_id = %user.user_id,
        room_id = %room_id
    );

    async move {
        let Some(channel) = ChannelName::parse(&room_id) else {
            debug!("join-room dropped: unparseable room id");
            return;
        };

        if channel.is_foreign_personal(&user.user_id) {
            debug!("join-room dropped: foreign personal channel");
            return;
        }

        state.registry.join(&socket.id.to_string(), &channel);
        ack_success(ack);
        info!(channel = %channel, "socket joined room");
    }
    .instrument(span)
    .await;
}

async fn handle_leave_room(
    socket: SocketRef,
    Data(room_id): Data<String>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(state): Extension<AppState>,
) {
    let span = info_span!(
        "socket leave-room",
        socket_id = %socket.id,
        user_id = %user.user_id,
        room_id = %room_id
    );

    async move {
        let Some(channel) = ChannelName::parse(&room_id) else {
            debug!("leave-room dropped: unparseable room id");
            return;
        };

        state.registry.leave(&socket.id.to_string(), &channel);
        ack_success(ack);
        info!(channel = %channel, "socket left room");
    }
    .instrument(span)
    .await;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatSendRequest {
    room_id: String,
    content: String,
}

async fn handle_chat_send(
    socket: SocketRef,
    Data(payload): Data<ChatSendRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(state): Extension<AppState>,
) {
    let span = info_span!(
        "socket chat-send",
        socket_id = %socket.id,
        user_id = %user.user_id,
        room_id = %payload.room_id
    );

    async move {
        if payload.content.trim().is_empty() {
            debug!("chat-send dropped: empty content");
            return;
        }
        let Some(channel) = ChannelName::parse(&payload.room_id) else {
            debug!("chat-send dropped: unparseable room id");
            return;
        };

        let conn_id = socket.id.to_string();
        if !state.registry.is_member(&conn_id, &channel) {
            ack_error::<RoomAck>(ack, AppError::not_in_room(&payload.room_id));
            return;
        }

        let message = chat_payload(&user.user_id, &payload.content);
        let delivered = state.registry.multicast(&channel, "message:new", &message);
        state.socket_metrics.inc_chat_messages();
        ack_success(ack);
        debug!(delivered, "chat message fanned out");
    }
    .instrument(span)
    .await;
}

async fn handle_typing_start(
    socket: SocketRef,
    Data(room_id): Data<String>,
    user: Extension<SocketUserContext>,
    state: Extension<AppState>,
) {
    handle_typing(socket, room_id, user.0, state.0, true).await;
}

async fn handle_typing_stop(
    socket: SocketRef,
    Data(room_id): Data<String>,
    user: Extension<SocketUserContext>,
    state: Extension<AppState>,
) {
    handle_typing(socket, room_id, user.0, state.0, false).await;
}

async fn handle_typing(
    socket: SocketRef,
    room_id: String,
    user: SocketUserContext,
    state: AppState,
    is_typing: bool,
) {
    let span = info_span!(
        "socket typing",
        socket_id = %socket.id,
        user_id = %user.user_id,
        room_id = %room_id,
        is_typing
    );

    async move {
        let Some(channel) = ChannelName::parse(&room_id) else {
            return;
        };

        let conn_id = socket.id.to_string();
        // Typing indicators for rooms the sender is not in are discarded.
        if !state.registry.is_member(&conn_id, &channel) {
            return;
        }

        let payload = typing_payload(&user.user_id, is_typing);
        state
            .registry
            .multicast_except(&channel, &conn_id, "typing:user", &payload);
    }
    .instrument(span)
    .await;
}

async fn handle_view_document(
    socket: SocketRef,
    Data(document_id): Data<String>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(state): Extension<AppState>,
) {
    let span = info_span!(
        "socket view-document",
        socket_id = %socket.id,
        user_id = %user.user_id,
        document_id = %document_id
    );

    async move {
        let trimmed = document_id.trim();
        if trimmed.is_empty() {
            debug!("view-document dropped: empty document id");
            return;
        }

        state
            .registry
            .join(&socket.id.to_string(), &ChannelName::document(trimmed));
        ack_success(ack);
    }
    .instrument(span)
    .await;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentCommentRequest {
    document_id: String,
    comment: String,
}

async fn handle_document_comment(
    socket: SocketRef,
    Data(payload): Data<DocumentCommentRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(state): Extension<AppState>,
) {
    let span = info_span!(
        "socket document-comment",
        socket_id = %socket.id,
        user_id = %user.user_id,
        document_id = %payload.document_id
    );

    async move {
        if payload.comment.trim().is_empty() || payload.document_id.trim().is_empty() {
            debug!("document-comment dropped: empty field");
            return;
        }

        let channel = ChannelName::document(payload.document_id.trim());
        let conn_id = socket.id.to_string();
        if !state.registry.is_member(&conn_id, &channel) {
            ack_error::<RoomAck>(ack, AppError::not_in_room(&channel.render()));
            return;
        }

        let message = comment_payload(&user.user_id, &payload.comment);
        let delivered = state
            .registry
            .multicast(&channel, "document:comment", &message);
        ack_success(ack);
        debug!(delivered, "document comment fanned out");
    }
    .instrument(span)
    .await;
}

async fn handle_disconnect(socket: SocketRef, Extension(state): Extension<AppState>) {
    let conn_id = socket.id.to_string();
    state.registry.unregister(&conn_id);
    state.socket_metrics.dec_connections();
    info!(socket_id = %conn_id, "socket disconnected");
}

fn chat_payload(user_id: &str, content: &str) -> JsonValue {
    json!({
        "userId": user_id,
        "content": content,
        "timestamp": Utc::now().timestamp_millis(),
    })
}

fn typing_payload(user_id: &str, is_typing: bool) -> JsonValue {
    json!({
        "userId": user_id,
        "isTyping": is_typing,
    })
}

fn comment_payload(user_id: &str, comment: &str) -> JsonValue {
    json!({
        "userId": user_id,
        "comment": comment,
        "timestamp": Utc::now().timestamp_millis(),
    })
}
