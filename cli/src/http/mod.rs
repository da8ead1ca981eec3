//! HTTP server: progress polling and run triggers for external clients.

pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use models::*;
pub use server::*;
pub use state::*;
