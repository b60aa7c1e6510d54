//! Error types for the email library.

use thiserror::Error;
use validator::ValidationErrors;

/// Email payload could not be accepted.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid email payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid email: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// SMTP configuration or delivery failure.
#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("invalid SMTP url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unknown SMTP scheme: {0}")]
    UnknownScheme(String),

    #[error("SMTP password is required")]
    MissingPassword,

    #[error("SMTP password is not valid UTF-8: {0}")]
    PasswordEncoding(#[from] std::string::FromUtf8Error),

    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("email has no recipients")]
    NoRecipients,

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}
