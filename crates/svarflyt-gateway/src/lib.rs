mod error;
mod routes;
mod server;
mod state;

pub use error::ApiError;
pub use routes::ChatRequest;
pub use server::{router, spawn_readiness_probe, GatewayServer};
pub use state::AppState;
