pub mod config;
pub mod export;
pub mod extractors;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod sessions;
pub mod state;
