mod broadcast;
mod health;
mod routes;

pub use broadcast::{broadcast_message, BroadcastRequest, BroadcastResponse};
pub use routes::api_routes;
