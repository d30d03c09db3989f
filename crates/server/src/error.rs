//! Top-level errors `serve` can return.

/// Errors raised while starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to bind the listening socket.
    #[error("Failed to bind to address: {0}")]
    Bind(#[source] std::io::Error),

    /// The server loop returned an I/O error.
    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),
}
