#![deny(clippy::all)]

pub mod error_codes;
mod sync;
pub mod telemetry;

pub use error_codes::ErrorCategory;
pub use error_codes::ErrorCode;
pub use sync::mutex_lock_or_recover;
pub use sync::poison_recovery_count;
