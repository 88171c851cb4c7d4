use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonServerError {
    #[error("Invalid listen address: {message}")]
    InvalidListen { message: String },
    #[error("Daemon I/O error ({operation}): {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}
