//! Per-transaction relay pipeline
//!
//! A [`Relay`] drives one [`RawTransaction`] through
//! `Receiving -> Parsing -> Translating -> Delivering -> Acknowledged`, or
//! into `Failed` from any earlier stage, and turns the result into exactly
//! one SMTP reply. It keeps no per-transaction state between calls.

use super::translator::Translator;
use crate::delivery::{DeliveryClient, DeliveryReceipt, OutboundMessage};
use crate::error::{RelayError, Result};
use crate::mime::{MimeParser, ParsedMessage};
use crate::smtp::{MessageStore, RawTransaction, SmtpReply};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Segments copied between cooperative yields while draining
const DRAIN_YIELD_INTERVAL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Receiving,
    Parsing,
    Translating,
    Delivering,
    Acknowledged,
    Failed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Receiving => "receiving",
            RelayState::Parsing => "parsing",
            RelayState::Translating => "translating",
            RelayState::Delivering => "delivering",
            RelayState::Acknowledged => "acknowledged",
            RelayState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result of one transaction
#[derive(Debug)]
pub struct RelayOutcome {
    /// Either `Acknowledged` or `Failed`
    pub state: RelayState,
    /// Stage that was active when the transaction failed
    pub failed_stage: Option<RelayState>,
    pub error: Option<RelayError>,
    pub receipt: Option<DeliveryReceipt>,
    pub reply: SmtpReply,
}

impl RelayOutcome {
    fn acknowledged(receipt: DeliveryReceipt) -> Self {
        let reply = SmtpReply::accepted(receipt.message_id.as_deref());
        Self {
            state: RelayState::Acknowledged,
            failed_stage: None,
            error: None,
            receipt: Some(receipt),
            reply,
        }
    }

    fn failed(stage: RelayState, error: RelayError) -> Self {
        Self {
            state: RelayState::Failed,
            failed_stage: Some(stage),
            reply: error.reply(),
            error: Some(error),
            receipt: None,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.state == RelayState::Acknowledged
    }
}

/// Relay orchestrator
pub struct Relay {
    client: Arc<dyn DeliveryClient>,
    translator: Translator,
}

impl Relay {
    pub fn new(client: Arc<dyn DeliveryClient>) -> Self {
        Self {
            client,
            translator: Translator::default(),
        }
    }

    /// Relay one transaction, observing `cancel` at every stage
    pub async fn process(
        &self,
        transaction: RawTransaction,
        cancel: &CancellationToken,
    ) -> RelayOutcome {
        let span = info_span!(
            "transaction",
            id = %transaction.id(),
            peer = ?transaction.peer()
        );

        async move {
            debug!(
                "Relaying {} bytes in {} segment(s)",
                transaction.len(),
                transaction.segments().len()
            );

            let mut stage = RelayState::Receiving;
            match self.run(transaction, cancel, &mut stage).await {
                Ok(receipt) => {
                    info!(
                        "Delivery accepted: status={} message_id={}",
                        receipt.status,
                        receipt.message_id.as_deref().unwrap_or("-")
                    );
                    RelayOutcome::acknowledged(receipt)
                }
                Err(err) => {
                    match &err {
                        RelayError::Translation(_) => {
                            error!("Translation defect during {}: {}", stage, err)
                        }
                        e if e.is_transient() => warn!("Relay failed during {}: {}", stage, err),
                        _ => error!("Relay rejected during {}: {}", stage, err),
                    }
                    RelayOutcome::failed(stage, err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        transaction: RawTransaction,
        cancel: &CancellationToken,
        stage: &mut RelayState,
    ) -> Result<DeliveryReceipt> {
        let raw = Self::drain(transaction.segments(), cancel).await?;
        drop(transaction);

        *stage = RelayState::Parsing;
        debug!("Stage: {}", stage);
        let parsed = Self::parse(raw, cancel).await?;
        debug!(
            "Parsed {} recipient(s), {} header(s), {} attachment(s) of {} bytes",
            parsed.recipient_count(),
            parsed.headers.len(),
            parsed.attachments.len(),
            parsed.total_attachment_size()
        );

        *stage = RelayState::Translating;
        debug!("Stage: {}", stage);
        let message = self.translate(&parsed)?;
        drop(parsed);

        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled(
                "cancelled before delivery".to_string(),
            ));
        }

        *stage = RelayState::Delivering;
        debug!("Stage: {}", stage);
        self.client.send(&message, cancel).await
    }

    /// Copy the received segments, in order, into one contiguous buffer
    async fn drain(segments: &[Bytes], cancel: &CancellationToken) -> Result<Vec<u8>> {
        let total = segments.iter().map(Bytes::len).sum();
        let mut buffer = Vec::with_capacity(total);

        for (index, segment) in segments.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled(
                    "cancelled while receiving".to_string(),
                ));
            }
            buffer.extend_from_slice(segment);

            if (index + 1) % DRAIN_YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
        }

        Ok(buffer)
    }

    async fn parse(raw: Vec<u8>, cancel: &CancellationToken) -> Result<ParsedMessage> {
        let task = tokio::task::spawn_blocking(move || MimeParser::parse(&raw));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled(
                "cancelled while parsing".to_string(),
            )),
            joined = task => joined.map_err(|e| {
                RelayError::MalformedMessage(format!("parser aborted: {}", e))
            })?,
        }
    }

    fn translate(&self, parsed: &ParsedMessage) -> Result<OutboundMessage> {
        catch_unwind(AssertUnwindSafe(|| self.translator.translate(parsed)))
            .map_err(|_| RelayError::Translation("translator panicked".to_string()))
    }
}

#[async_trait]
impl MessageStore for Relay {
    async fn save(&self, transaction: RawTransaction, cancel: &CancellationToken) -> SmtpReply {
        self.process(transaction, cancel).await.reply
    }
}
