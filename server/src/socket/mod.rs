mod ack;
mod auth;
mod events;
pub mod registry;
pub mod rooms;
pub mod types;

use socketioxide::{SocketIo, layer::SocketIoLayer};

use crate::state::AppState;

/// Builds the socket.io tower layer with the authenticating connect
/// middleware and all event handlers wired onto the root namespace.
pub fn build_socket_layer(state: AppState) -> (SocketIoLayer, SocketIo) {
    let (layer, io) = auth::build_socket(state.clone());
    events::register_namespace(&io, state);
    (layer, io)
}
