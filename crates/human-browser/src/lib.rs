#![deny(clippy::all)]
// Binary-first crate: some internal API surface is only reached from tests.
#![allow(dead_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod adapters;
mod app;
mod common;
mod domain;
mod infra;
mod usecases;

#[cfg(test)]
mod test_support;

pub use app::Application;
pub use app::daemon::DaemonHandle;
pub use app::daemon::DaemonServerError;
pub use app::daemon::serve;
pub use infra::config::DaemonConfig;
