//! Completed mail transactions and the store they are handed to

use crate::smtp::reply::SmtpReply;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One complete DATA payload plus its envelope.
///
/// The payload is kept as the sequence of segments it was received in; the
/// consumer is responsible for materializing it. A transaction is moved into
/// [`MessageStore::save`] and therefore consumed exactly once.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    id: String,
    peer: Option<SocketAddr>,
    mail_from: Option<String>,
    rcpt_to: Vec<String>,
    segments: Vec<Bytes>,
}

impl RawTransaction {
    pub fn new(
        peer: Option<SocketAddr>,
        mail_from: Option<String>,
        rcpt_to: Vec<String>,
        segments: Vec<Bytes>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            peer,
            mail_from,
            rcpt_to,
            segments,
        }
    }

    /// Build a transaction from a contiguous payload with an empty envelope
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(None, None, Vec::new(), vec![data.into()])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn mail_from(&self) -> Option<&str> {
        self.mail_from.as_deref()
    }

    pub fn rcpt_to(&self) -> &[String] {
        &self.rcpt_to
    }

    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// Total payload size in bytes
    pub fn len(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capability the SMTP transport hands completed transactions to
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Take ownership of a transaction and produce the reply for the client
    async fn save(&self, transaction: RawTransaction, cancel: &CancellationToken) -> SmtpReply;
}
