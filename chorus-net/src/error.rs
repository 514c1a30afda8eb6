use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection {0} is closed")]
    ConnectionClosed(String),

    #[error("outbound buffer full for connection {0}")]
    BufferFull(String),

    #[error("connection {0} not found")]
    ConnectionNotFound(String),
}
