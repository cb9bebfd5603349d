//! SendGrid v3 mail send client
//!
//! This implementation posts the translated message to `/v3/mail/send` and
//! maps the HTTP outcome onto the relay's transient/permanent taxonomy.

use super::{DeliveryClient, DeliveryReceipt, MailAddress, OutboundMessage};
use crate::config::DeliveryConfig;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest provider error body kept in an error message
const MAX_ERROR_DETAIL: usize = 256;

/// SendGrid delivery client
pub struct SendGridClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl SendGridClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("relay-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: "https://api.sendgrid.com".to_string(),
            client,
        })
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        Ok(Self::new(
            config.api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_base_url(config.api_base_url.clone()))
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v3/mail/send", self.base_url)
    }

    /// Map a non-success status onto the failure taxonomy.
    ///
    /// A 4xx status is transient and the sending MTA is asked to retry,
    /// except a malformed payload (400) or an invalid credential (401, 403).
    /// A 5xx status is permanent.
    pub fn classify_status(status: u16, detail: &str) -> RelayError {
        let detail: String = detail.chars().take(MAX_ERROR_DETAIL).collect();
        let message = format!("provider returned {}: {}", status, detail.trim());

        match status {
            400 | 401 | 403 => RelayError::DeliveryPermanent(message),
            400..=499 => RelayError::DeliveryTransient(message),
            _ => RelayError::DeliveryPermanent(message),
        }
    }

    fn classify_transport_error(err: reqwest::Error) -> RelayError {
        if err.is_builder() {
            RelayError::DeliveryPermanent(format!("invalid request: {}", err))
        } else if err.is_timeout() {
            RelayError::DeliveryTransient(format!("request timed out: {}", err))
        } else {
            RelayError::DeliveryTransient(format!("request failed: {}", err))
        }
    }
}

/// Mail send request body
#[derive(Debug, Serialize)]
struct SendGridRequest<'a> {
    personalizations: Vec<SendGridPersonalization<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<SendGridAddress<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<SendGridAddress<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    content: Vec<SendGridContent<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SendGridAttachment<'a>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct SendGridPersonalization<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    to: Vec<SendGridAddress<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<SendGridAddress<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<SendGridAddress<'a>>,
}

#[derive(Debug, Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct SendGridAttachment<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(rename = "type")]
    media_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disposition: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_id: Option<&'a str>,
}

impl<'a> From<&'a MailAddress> for SendGridAddress<'a> {
    fn from(address: &'a MailAddress) -> Self {
        Self {
            email: &address.email,
            name: address.name.as_deref(),
        }
    }
}

fn addresses(list: &[MailAddress]) -> Vec<SendGridAddress<'_>> {
    list.iter().map(SendGridAddress::from).collect()
}

impl<'a> SendGridRequest<'a> {
    fn from_message(message: &'a OutboundMessage) -> Self {
        // The API requires text/plain to precede text/html
        let mut content = Vec::new();
        if let Some(text) = &message.plain_text_content {
            content.push(SendGridContent {
                content_type: "text/plain",
                value: text,
            });
        }
        if let Some(html) = &message.html_content {
            content.push(SendGridContent {
                content_type: "text/html",
                value: html,
            });
        }

        Self {
            personalizations: message
                .personalizations
                .iter()
                .map(|p| SendGridPersonalization {
                    to: addresses(&p.to),
                    cc: addresses(&p.cc),
                    bcc: addresses(&p.bcc),
                })
                .collect(),
            from: message.from.as_ref().map(SendGridAddress::from),
            reply_to: message.reply_to.as_ref().map(SendGridAddress::from),
            subject: message.subject.as_deref(),
            content,
            attachments: message
                .attachments
                .iter()
                .map(|a| SendGridAttachment {
                    content: a.content.as_deref(),
                    media_type: &a.media_type,
                    filename: a.filename.as_deref(),
                    disposition: a.disposition.as_deref(),
                    content_id: a.content_id.as_deref(),
                })
                .collect(),
            headers: message.header_map(),
        }
    }
}

#[async_trait]
impl DeliveryClient for SendGridClient {
    async fn send(
        &self,
        message: &OutboundMessage,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReceipt> {
        if message.has_duplicate_headers() {
            warn!("Repeated header names collapsed to their last value");
        }

        let body = SendGridRequest::from_message(message);
        debug!(
            "SendGrid: posting {} personalization(s), {} attachment(s) to {}",
            body.personalizations.len(),
            body.attachments.len(),
            self.endpoint()
        );

        let request = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RelayError::Cancelled(
                    "cancelled while the delivery request was in flight".to_string(),
                ));
            }
            response = request.send() => response.map_err(Self::classify_transport_error)?,
        };

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            debug!("SendGrid: accepted with status {}", status);
            return Ok(DeliveryReceipt {
                status: status.as_u16(),
                message_id,
            });
        }

        let detail = response.text().await.unwrap_or_default();
        warn!("SendGrid: request failed with status {}", status);
        Err(Self::classify_status(status.as_u16(), &detail))
    }
}
