//! HTTP surface for photoloom.
//!
//! Exposes config, state, error handling, and routes so integration
//! tests and the binary entrypoint can both access them. Identity is
//! trusted from the upstream gateway via the `x-photoloom-user` header;
//! there is no session handling here.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;
