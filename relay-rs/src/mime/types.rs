/// An address as rendered by the MIME parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeAddress {
    /// The addr-spec, e.g. `user@example.com`
    pub address: String,
    /// Display name exactly as parsed; may be empty or whitespace
    pub name: Option<String>,
}

impl MimeAddress {
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_string),
        }
    }
}

/// One top-level header field, in message order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeHeader {
    /// Field name as written in the message
    pub name: String,
    /// Unfolded field value
    pub value: String,
}

impl MimeHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A body part flagged as an attachment (including inline parts)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyPart {
    /// Transfer-decoded content; `None` for container parts without content of their own
    pub content: Option<Vec<u8>>,
    /// Content-ID without angle brackets
    pub content_id: Option<String>,
    /// Content-Disposition value, e.g. "attachment" or "inline"
    pub disposition: Option<String>,
    /// `name` attribute of the Content-Type header
    pub content_type_name: Option<String>,
    /// `filename` attribute of the Content-Disposition header
    pub disposition_filename: Option<String>,
    /// MIME type, e.g. "image/png"
    pub media_type: String,
}

/// Structured view of one received message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    pub from: Vec<MimeAddress>,
    pub to: Vec<MimeAddress>,
    pub cc: Vec<MimeAddress>,
    pub bcc: Vec<MimeAddress>,
    pub reply_to: Vec<MimeAddress>,
    pub subject: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub headers: Vec<MimeHeader>,
    pub attachments: Vec<BodyPart>,
}

impl ParsedMessage {
    pub fn new() -> Self {
        ParsedMessage::default()
    }

    /// Number of addresses across To, Cc and Bcc
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Get total size of all attachments in bytes
    pub fn total_attachment_size(&self) -> usize {
        self.attachments
            .iter()
            .filter_map(|a| a.content.as_ref())
            .map(Vec::len)
            .sum()
    }
}
