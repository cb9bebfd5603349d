//! Header forwarding policy

/// Header names never replayed to the delivery provider.
///
/// Structural fields are mapped explicitly; the rest are transport or
/// provider artifacts.
const DENYLIST: &[&str] = &[
    "x-sg-id",
    "x-sg-eid",
    "received",
    "dkim-signature",
    "content-type",
    "content-transfer-encoding",
    "to",
    "from",
    "subject",
    "reply-to",
    "cc",
    "bcc",
];

/// Decides which header fields are forwarded
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderFilter;

impl HeaderFilter {
    pub fn new() -> Self {
        Self
    }

    /// `false` when `name` matches a denylisted header, ignoring ASCII case
    pub fn should_forward(&self, name: &str) -> bool {
        !DENYLIST
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(name.trim()))
    }
}
