//! Provider-shaped outbound message

use std::collections::BTreeMap;

/// Address as the delivery provider expects it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAddress {
    pub email: String,
    /// Never `Some("")` or whitespace
    pub name: Option<String>,
}

impl MailAddress {
    /// Build an address, normalizing a blank display name to `None`
    pub fn new(email: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            email: email.into(),
            name: name
                .filter(|n| !n.trim().is_empty())
                .map(str::to_string),
        }
    }
}

/// Recipients delivered together as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Personalization {
    pub to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub bcc: Vec<MailAddress>,
}

impl Personalization {
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// Base64 of the decoded part content
    pub content: Option<String>,
    pub content_id: Option<String>,
    pub disposition: Option<String>,
    pub filename: Option<String>,
    pub media_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: Option<MailAddress>,
    pub personalizations: Vec<Personalization>,
    pub subject: Option<String>,
    pub html_content: Option<String>,
    pub plain_text_content: Option<String>,
    pub reply_to: Option<MailAddress>,
    /// Forwarded headers in message order, duplicates included
    pub headers: Vec<(String, String)>,
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    /// Value of a forwarded header; the last occurrence wins.
    ///
    /// Names are matched exactly, as they are keyed on the wire.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Headers collapsed into a map, last occurrence of a name winning
    pub fn header_map(&self) -> BTreeMap<String, String> {
        self.headers.iter().cloned().collect()
    }

    /// Whether collapsing into [`Self::header_map`] drops any header
    pub fn has_duplicate_headers(&self) -> bool {
        self.header_map().len() != self.headers.len()
    }

    pub fn recipient_count(&self) -> usize {
        self.personalizations
            .iter()
            .map(Personalization::recipient_count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_is_absent() {
        assert_eq!(MailAddress::new("a@x.com", Some("")).name, None);
        assert_eq!(MailAddress::new("a@x.com", Some("  \t")).name, None);
        assert_eq!(MailAddress::new("a@x.com", None).name, None);
        assert_eq!(
            MailAddress::new("a@x.com", Some("Alice")).name.as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn test_header_lookup_last_wins() {
        let message = OutboundMessage {
            headers: vec![
                ("References".to_string(), "<1@x>".to_string()),
                ("X-Custom".to_string(), "1".to_string()),
                ("References".to_string(), "<2@x>".to_string()),
            ],
            ..Default::default()
        };

        assert_eq!(message.header("References"), Some("<2@x>"));
        assert_eq!(message.header("references"), None);
        assert!(message.has_duplicate_headers());
        assert_eq!(message.header_map().len(), 2);
        assert_eq!(message.header_map()["References"], "<2@x>");
    }
}
