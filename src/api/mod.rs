//! REST API module

pub mod handlers;
pub mod models;
pub mod routes;
pub mod snippets;
pub mod users;

pub use routes::{AppState, create_router, resource_router};
