pub mod api;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod lobby;
pub mod moderation;
pub mod poller;
pub mod projector;
pub mod store;
pub mod types;
pub mod voting;
