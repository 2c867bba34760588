pub mod auth;
pub mod engagement;
pub mod error;
pub mod models;
pub mod openapi;
pub mod rate_limit;
pub mod reconcile;
pub mod repo;
pub mod routes;
pub mod rules;
pub mod service;
pub mod tree;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use service::EngagementService;
