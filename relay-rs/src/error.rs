use crate::smtp::reply::SmtpReply;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP protocol error: {0}")]
    SmtpProtocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Transient delivery failure: {0}")]
    DeliveryTransient(String),

    #[error("Permanent delivery failure: {0}")]
    DeliveryPermanent(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether the sending MTA should retry the transaction later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Io(_)
                | RelayError::DeliveryTransient(_)
                | RelayError::Cancelled(_)
        )
    }

    /// The single SMTP reply reported to the client for this error.
    /// The reply text never carries diagnostic detail.
    pub fn reply(&self) -> SmtpReply {
        match self {
            RelayError::MalformedMessage(_) => SmtpReply::malformed_message(),
            RelayError::DeliveryPermanent(_) => SmtpReply::delivery_rejected(),
            RelayError::Cancelled(_) => SmtpReply::delivery_unconfirmed(),
            RelayError::Io(_) | RelayError::DeliveryTransient(_) => SmtpReply::try_again_later(),
            RelayError::SmtpProtocol(_)
            | RelayError::Config(_)
            | RelayError::Translation(_)
            | RelayError::Json(_) => SmtpReply::internal_error(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
