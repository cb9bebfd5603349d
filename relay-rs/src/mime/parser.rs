use crate::error::{RelayError, Result};
use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{
    Addr, Address, Encoding, Message, MessageParser, MessagePart, MimeHeaders, PartType,
};

use super::types::{BodyPart, MimeAddress, MimeHeader, ParsedMessage};

/// MIME message parser
///
/// Decoding is delegated to `mail-parser`; this type only projects the parsed
/// tree onto the owned [`ParsedMessage`] model.
pub struct MimeParser;

impl MimeParser {
    /// Parse a raw RFC 5322 message.
    ///
    /// Fails with [`RelayError::MalformedMessage`] when the input is empty or
    /// no header section can be recovered from it.
    pub fn parse(raw: &[u8]) -> Result<ParsedMessage> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(RelayError::MalformedMessage("Empty message".to_string()));
        }

        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| RelayError::MalformedMessage("Unparsable MIME structure".to_string()))?;

        if message.headers().is_empty() {
            return Err(RelayError::MalformedMessage(
                "Message has no header fields".to_string(),
            ));
        }

        Ok(ParsedMessage {
            from: Self::addresses(message.from()),
            to: Self::addresses(message.to()),
            cc: Self::addresses(message.cc()),
            bcc: Self::addresses(message.bcc()),
            reply_to: Self::addresses(message.reply_to()),
            subject: message.subject().map(str::to_string),
            text_body: Self::text_body(&message),
            html_body: Self::html_body(&message),
            headers: Self::headers(&message),
            attachments: message
                .attachments()
                .map(|part| Self::body_part(message.raw_message(), part))
                .collect(),
        })
    }

    /// Flatten an address list, including group members, in header order
    fn addresses(address: Option<&Address<'_>>) -> Vec<MimeAddress> {
        let Some(address) = address else {
            return Vec::new();
        };

        let addrs: Vec<&Addr<'_>> = match address {
            Address::List(list) => list.iter().collect(),
            Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
        };

        addrs
            .into_iter()
            .filter_map(|addr| {
                let email = addr.address()?.trim();
                if email.is_empty() {
                    return None;
                }
                Some(MimeAddress::new(email, addr.name()))
            })
            .collect()
    }

    /// First genuine text/plain body.
    ///
    /// `mail-parser` lists an HTML-only message under its text bodies too
    /// (converting on access), so only parts that really are plain text count.
    fn text_body(message: &Message<'_>) -> Option<String> {
        message
            .text_body
            .iter()
            .filter_map(|id| message.parts.get(*id as usize))
            .find_map(|part| match &part.body {
                PartType::Text(text) => Some(text.to_string()),
                _ => None,
            })
    }

    /// First genuine text/html body
    fn html_body(message: &Message<'_>) -> Option<String> {
        message
            .html_body
            .iter()
            .filter_map(|id| message.parts.get(*id as usize))
            .find_map(|part| match &part.body {
                PartType::Html(html) => Some(html.to_string()),
                _ => None,
            })
    }

    /// Top-level header fields in message order, values unfolded but
    /// otherwise untouched
    fn headers(message: &Message<'_>) -> Vec<MimeHeader> {
        let raw = message.raw_message();

        message
            .headers()
            .iter()
            .map(|header| {
                let value = raw
                    .get(header.offset_start as usize..header.offset_end as usize)
                    .map(Self::unfold)
                    .unwrap_or_default();
                MimeHeader::new(header.name.as_str(), value)
            })
            .collect()
    }

    /// Remove folding line breaks (RFC 5322 section 2.2.3)
    fn unfold(raw: &[u8]) -> String {
        String::from_utf8_lossy(raw)
            .replace("\r\n", "")
            .replace('\n', "")
            .trim()
            .to_string()
    }

    fn body_part(raw: &[u8], part: &MessagePart<'_>) -> BodyPart {
        let content_type = part.content_type();
        let disposition = part.content_disposition();

        BodyPart {
            content: match &part.body {
                PartType::Multipart(_) => None,
                _ => Some(Self::decoded_content(raw, part)),
            },
            content_id: part.content_id().map(str::to_string),
            disposition: disposition.map(|d| d.ctype().to_string()),
            content_type_name: content_type
                .and_then(|ct| ct.attribute("name"))
                .map(str::to_string),
            disposition_filename: disposition
                .and_then(|d| d.attribute("filename"))
                .map(str::to_string),
            media_type: Self::media_type(part),
        }
    }

    /// Part body with only the transfer encoding undone.
    ///
    /// `mail-parser` converts text parts to UTF-8 from their declared
    /// charset; attachments must keep their original bytes, so they are
    /// decoded again from the raw message.
    fn decoded_content(raw: &[u8], part: &MessagePart<'_>) -> Vec<u8> {
        let Some(encoded) = raw.get(part.offset_body..part.offset_end) else {
            return part.contents().to_vec();
        };

        let decoded = match part.encoding {
            Encoding::Base64 => base64_decode(encoded),
            Encoding::QuotedPrintable => quoted_printable_decode(encoded),
            Encoding::None => Some(encoded.to_vec()),
        };

        decoded.unwrap_or_else(|| part.contents().to_vec())
    }

    /// `type/subtype`, falling back to what the decoded body implies
    fn media_type(part: &MessagePart<'_>) -> String {
        match part.content_type() {
            Some(ct) => match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            },
            None => match &part.body {
                PartType::Text(_) => "text/plain",
                PartType::Html(_) => "text/html",
                PartType::Message(_) => "message/rfc822",
                _ => "application/octet-stream",
            }
            .to_string(),
        }
    }
}
