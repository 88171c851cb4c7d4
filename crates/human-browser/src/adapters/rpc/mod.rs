pub mod params;
pub mod types;

pub use types::ApiResponse;
pub use types::CommandRequest;

/// Header carrying the daemon token on HTTP requests.
pub const TOKEN_HEADER: &str = "x-hb-token";
