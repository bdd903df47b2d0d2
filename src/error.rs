//! Error types for UCS API interactions.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UcsError {
    #[error("UCS API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UCS login rejected (errorCode {0})")]
    LoginRejected(String),

    #[error("UCS login returned no session cookie")]
    MissingCookie,

    #[error("Unable to login to UCS")]
    AuthExhausted,
}
