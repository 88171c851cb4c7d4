#![deny(clippy::all)]

pub mod elements;
pub mod ports;
pub mod router;

pub use router::CommandRouter;
pub use router::RouterConfig;
