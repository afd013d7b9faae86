pub mod handlers;
pub mod routes;
pub mod stats;

pub use routes::create_api_router;
