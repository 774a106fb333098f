pub mod broadcaster;
pub mod rest;
pub mod websocket;

pub use broadcaster::Broadcaster;
pub use rest::{create_router, ApiState};
