//! Docent API crate - axum HTTP binding for the chat engine.
//!
//! Exposes the single-conversation engine over HTTP: send a message,
//! cancel the turn in flight, read the transcript, and check health.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
