//! MIME message parsing
//!
//! This module turns a raw message into the owned [`ParsedMessage`] the
//! relay translates from.

pub mod parser;
pub mod types;

pub use parser::MimeParser;
pub use types::{BodyPart, MimeAddress, MimeHeader, ParsedMessage};
