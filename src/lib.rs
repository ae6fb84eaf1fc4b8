pub mod api;
pub mod config;
pub mod error;
pub mod fake_api;
pub mod guard;
pub mod http_client;
pub mod models;
pub mod op;
pub mod orchestrator;
pub mod poller;
pub mod session;
pub mod state;
pub mod token_store;
