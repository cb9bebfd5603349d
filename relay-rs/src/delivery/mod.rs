//! Delivery of translated messages to the email API
//!
//! - [`message`]: the provider-shaped [`OutboundMessage`]
//! - [`sendgrid`]: HTTP client for the SendGrid v3 mail send endpoint

use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod message;
pub mod sendgrid;

pub use message::{Attachment, MailAddress, OutboundMessage, Personalization};
pub use sendgrid::SendGridClient;

/// What the provider reported for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// HTTP status returned by the provider
    pub status: u16,
    /// Provider-side message identifier, when one was returned
    pub message_id: Option<String>,
}

/// Outbound delivery capability
///
/// Implementations classify every failure as either
/// [`RelayError::DeliveryTransient`](crate::error::RelayError::DeliveryTransient)
/// or [`RelayError::DeliveryPermanent`](crate::error::RelayError::DeliveryPermanent),
/// and report [`RelayError::Cancelled`](crate::error::RelayError::Cancelled)
/// when `cancel` fires before the outcome is known.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(
        &self,
        message: &OutboundMessage,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReceipt>;
}
