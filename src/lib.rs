pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod json_patch;
pub mod mail;
pub mod messaging;
pub mod middleware;
pub mod queue;
pub mod services;
pub mod state;
pub mod types;

#[cfg(test)]
pub mod testing;
