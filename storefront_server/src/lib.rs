//! # Storefront server
//! This module hosts the HTTP surface for the order & payment consistency engine. It is responsible for:
//! Translating HTTP requests into engine API calls.
//! Mapping the engine error taxonomy onto status codes and stable machine-readable `code` strings.
//! Running the periodic invoice expiry sweep.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Identity
//! Requests carry the acting identity in an `x-actor-id` / `x-actor-role` header pair. How those headers come to be
//! trusted (a gateway, a session layer) is deliberately outside this server's scope.

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod integrations;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
