use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {uri} after {attempts} attempt(s): {last_error}")]
    ConnectFailed {
        uri: String,
        attempts: u32,
        last_error: String,
    },

    #[error("call timed out waiting for a response")]
    Timeout,

    #[error("connection closed before a response arrived")]
    Disconnected,

    #[error("server rejected the call: rate limited")]
    RateLimited,
}
