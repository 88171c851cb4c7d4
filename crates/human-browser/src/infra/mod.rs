#![deny(clippy::all)]

//! Daemon-side and client-side plumbing: bridge state, config, state file, HTTP client.

pub mod bridge;
pub mod config;
pub mod http_client;
pub mod state_file;
