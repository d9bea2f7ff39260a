pub mod activity;
pub mod handlers;
pub mod middleware;
pub mod monitor;
pub mod routes;
pub mod runs;

pub use routes::create_router;
