pub mod auth;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod observability;
pub mod router;
pub mod socket;
pub mod state;

pub use error::AppError;
pub use state::{AppState, build_state};

#[cfg(test)]
pub mod test_support;
