// Router configuration

use axum::{
    Router,
    http::Method,
    routing::{get, post, put},
};
use socketioxide::SocketIo;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{dispatch_handlers::*, health_handlers::*, notification_handlers::*},
    observability,
    state::AppState,
};

pub fn build_router(state: AppState) -> (Router, SocketIo) {
    let (socket_layer, socket_io) = crate::socket::build_socket_layer(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let router = Router::new()
        // Health & Info
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        // Notification inbox
        .route("/api/notifications", get(list_notifications_handler))
        .route("/api/notifications/read-all", put(mark_all_read_handler))
        .route("/api/notifications/{id}/read", put(mark_read_handler))
        // Notification write paths
        .route(
            "/api/documents/{doc_id}/share",
            post(share_document_handler),
        )
        .route(
            "/api/documents/{doc_id}/comments",
            post(comment_document_handler),
        )
        .route(
            "/api/articles/{article_id}/publish",
            post(publish_article_handler),
        )
        .route("/api/admin/messages", post(admin_message_handler));

    let router = router
        .layer(socket_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(observability::http_make_span())
                .on_response(observability::response_logger()),
        )
        .layer(cors)
        .with_state(state);

    (router, socket_io)
}
