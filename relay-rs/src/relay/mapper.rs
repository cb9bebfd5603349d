//! Address and attachment mapping onto the provider model

use crate::delivery::{Attachment, MailAddress};
use crate::mime::{BodyPart, MimeAddress};
use base64::{engine::general_purpose, Engine as _};

/// Map a parsed address, dropping a blank display name
pub fn map_address(address: &MimeAddress) -> MailAddress {
    MailAddress::new(address.address.as_str(), address.name.as_deref())
}

/// Map an attachment part.
///
/// The filename comes from the Content-Type `name` attribute; the
/// Content-Disposition `filename` is not consulted.
pub fn map_attachment(part: &BodyPart) -> Attachment {
    Attachment {
        content: part
            .content
            .as_deref()
            .map(|bytes| general_purpose::STANDARD.encode(bytes)),
        content_id: part.content_id.clone(),
        disposition: part.disposition.clone(),
        filename: part.content_type_name.clone(),
        media_type: part.media_type.clone(),
    }
}
