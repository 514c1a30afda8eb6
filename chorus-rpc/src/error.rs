use thiserror::Error;

/// Raised synchronously by [`crate::Dispatcher::register`]; registration
/// errors are fatal at server startup (§7), never surfaced over the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("method alias {0:?} is already registered")]
    DuplicateAlias(String),
}
