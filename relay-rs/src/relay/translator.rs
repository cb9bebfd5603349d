use super::filter::HeaderFilter;
use super::mapper::{map_address, map_attachment};
use crate::delivery::{OutboundMessage, Personalization};
use crate::mime::ParsedMessage;

/// Translates parsed messages into provider messages
#[derive(Debug, Clone, Default)]
pub struct Translator {
    filter: HeaderFilter,
}

impl Translator {
    /// Build the outbound message for one transaction.
    ///
    /// All recipients go into a single personalization, in header order.
    /// Missing optional fields stay absent.
    pub fn translate(&self, message: &ParsedMessage) -> OutboundMessage {
        let personalization = Personalization {
            to: message.to.iter().map(map_address).collect(),
            cc: message.cc.iter().map(map_address).collect(),
            bcc: message.bcc.iter().map(map_address).collect(),
        };

        let headers = message
            .headers
            .iter()
            .filter(|h| self.filter.should_forward(&h.name))
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect();

        OutboundMessage {
            from: message.from.first().map(map_address),
            personalizations: vec![personalization],
            subject: message.subject.clone(),
            html_content: message.html_body.clone(),
            plain_text_content: message.text_body.clone(),
            reply_to: message.reply_to.first().map(map_address),
            headers,
            attachments: message.attachments.iter().map(map_attachment).collect(),
        }
    }
}
