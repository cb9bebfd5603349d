//! SMTP replies produced at the end of a mail transaction

use std::fmt;

/// Outcome class of a reply as seen by the sending MTA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Accepted,
    TransientFailure,
    PermanentFailure,
}

/// A single-line SMTP reply with an enhanced status code (RFC 3463)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    code: u16,
    enhanced: &'static str,
    text: String,
}

impl SmtpReply {
    pub fn new(code: u16, enhanced: &'static str, text: impl Into<String>) -> Self {
        Self {
            code,
            enhanced,
            text: text.into(),
        }
    }

    /// Message handed to the delivery provider
    pub fn accepted(provider_id: Option<&str>) -> Self {
        let text = match provider_id {
            Some(id) => format!("OK: queued as {}", id),
            None => "OK: queued".to_string(),
        };
        Self::new(250, "2.0.0", text)
    }

    pub fn try_again_later() -> Self {
        Self::new(451, "4.3.0", "Delivery temporarily unavailable, try again later")
    }

    pub fn delivery_unconfirmed() -> Self {
        Self::new(451, "4.4.7", "Delivery not confirmed, try again later")
    }

    pub fn malformed_message() -> Self {
        Self::new(554, "5.6.0", "Message could not be parsed")
    }

    pub fn delivery_rejected() -> Self {
        Self::new(554, "5.7.0", "Message rejected by delivery service")
    }

    pub fn internal_error() -> Self {
        Self::new(554, "5.3.0", "Message could not be relayed")
    }

    pub fn message_too_large(max: usize) -> Self {
        Self::new(552, "5.3.4", format!("Message too large (max {} bytes)", max))
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn class(&self) -> ReplyClass {
        match self.code {
            200..=399 => ReplyClass::Accepted,
            400..=499 => ReplyClass::TransientFailure,
            _ => ReplyClass::PermanentFailure,
        }
    }

    /// Wire form including the trailing CRLF
    pub fn to_line(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.code, self.enhanced, self.text)
    }
}
