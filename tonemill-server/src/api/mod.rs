//! HTTP API handlers for tonemill-server

pub mod convert;
pub mod health;
pub mod index;

pub use convert::convert_routes;
pub use health::health_routes;
pub use index::index_routes;
