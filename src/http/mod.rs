//! HTTP surface: routes, session middleware and error mapping

pub mod middleware;
pub mod routes;

pub use routes::build_router;
