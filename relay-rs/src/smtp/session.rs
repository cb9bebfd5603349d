use crate::error::{RelayError, Result};
use crate::smtp::commands::SmtpCommand;
use crate::smtp::reply::SmtpReply;
use crate::smtp::transaction::{MessageStore, RawTransaction};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Maximum line length in SMTP protocol (RFC 5321)
const MAX_LINE_LENGTH: usize = 1000;

/// Timeout for reading a command line
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300); // 5 minutes

/// Timeout for reading one DATA line
const DATA_TIMEOUT: Duration = Duration::from_secs(600); // 10 minutes

/// Maximum number of errors before disconnecting
const MAX_ERRORS: usize = 10;

/// Per-session resource limits
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub max_message_size: usize,
    pub max_recipients: usize,
    /// Deadline for relaying one completed transaction
    pub transaction_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_message_size: 25 * 1024 * 1024,
            max_recipients: 100,
            transaction_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SmtpState {
    Fresh,
    Greeted,
    MailFrom,
    RcptTo,
    Data,
}

/// How a DATA phase ended
enum DataOutcome {
    Complete,
    TooLarge,
}

/// SMTP session handler feeding completed transactions to a [`MessageStore`]
///
/// The session only speaks enough ESMTP to receive mail: no TLS, no AUTH.
/// Every transaction is relayed under a cancellation token derived from the
/// session's own token, cancelled when the transaction deadline expires.
pub struct SmtpSession {
    state: SmtpState,
    from: Option<String>,
    to: Vec<String>,
    data: Vec<Bytes>,
    data_size: usize,
    hostname: String,
    store: Arc<dyn MessageStore>,
    limits: SessionLimits,
    error_count: usize,
    peer: Option<SocketAddr>,
    cancel: CancellationToken,
}

impl SmtpSession {
    pub fn new(
        hostname: String,
        store: Arc<dyn MessageStore>,
        limits: SessionLimits,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: SmtpState::Fresh,
            from: None,
            to: Vec::new(),
            data: Vec::new(),
            data_size: 0,
            hostname,
            store,
            limits,
            error_count: 0,
            peer: None,
            cancel,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Run the session until QUIT, disconnect, shutdown or too many errors
    pub async fn handle<S>(mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf_reader = BufReader::new(stream);

        buf_reader
            .write_all(format!("220 {} ESMTP Service Ready\r\n", self.hostname).as_bytes())
            .await?;

        let mut line = Vec::new();

        loop {
            if self.error_count >= MAX_ERRORS {
                warn!("Too many errors, disconnecting");
                buf_reader
                    .write_all(b"421 Too many errors, closing connection\r\n")
                    .await?;
                return Ok(());
            }

            line.clear();

            let read_result = tokio::select! {
                _ = self.cancel.cancelled() => None,
                r = timeout(COMMAND_TIMEOUT, buf_reader.read_until(b'\n', &mut line)) => Some(r),
            };

            let n = match read_result {
                None => {
                    info!("Shutting down session");
                    buf_reader
                        .write_all(b"421 Service shutting down\r\n")
                        .await?;
                    return Ok(());
                }
                Some(Ok(Ok(n))) => n,
                Some(Ok(Err(e))) => {
                    error!("IO error reading line: {}", e);
                    return Err(e.into());
                }
                Some(Err(_)) => {
                    warn!("Command timeout, disconnecting");
                    buf_reader
                        .write_all(b"421 Timeout, closing connection\r\n")
                        .await?;
                    return Ok(());
                }
            };

            if n == 0 {
                debug!("Client disconnected");
                return Ok(());
            }

            if line.len() > MAX_LINE_LENGTH {
                error!("Line too long: {} bytes", line.len());
                buf_reader.write_all(b"500 Line too long\r\n").await?;
                self.error_count += 1;
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            let line_trimmed = text.trim_end();
            debug!("Received: {}", line_trimmed);

            let cmd = match SmtpCommand::parse(line_trimmed) {
                Ok(cmd) => cmd,
                Err(e) => {
                    error!("Command parse error: {}", e);
                    buf_reader
                        .write_all(b"501 Syntax error in parameters or arguments\r\n")
                        .await?;
                    self.error_count += 1;
                    continue;
                }
            };

            let response = self.handle_command(cmd);
            buf_reader.write_all(response.as_bytes()).await?;

            if response.starts_with("221") {
                return Ok(());
            }

            if self.state == SmtpState::Data {
                let reply = match self.receive_data(&mut buf_reader).await {
                    Ok(DataOutcome::Complete) => self.relay_transaction().await,
                    Ok(DataOutcome::TooLarge) => {
                        SmtpReply::message_too_large(self.limits.max_message_size)
                    }
                    Err(e) => {
                        // The stream is no longer in a known state
                        error!("Error receiving data: {}", e);
                        let _ = buf_reader
                            .write_all(b"451 Error receiving message\r\n")
                            .await;
                        return Err(e);
                    }
                };

                buf_reader.write_all(reply.to_line().as_bytes()).await?;
                self.reset_transaction();
            }
        }
    }

    fn handle_command(&mut self, cmd: SmtpCommand) -> String {
        let state = self.state.clone();
        match (state, cmd) {
            (_, SmtpCommand::Helo(domain)) => {
                info!("HELO from {}", domain);
                self.reset_transaction();
                self.state = SmtpState::Greeted;
                format!("250 {} Hello {}\r\n", self.hostname, domain)
            }
            (_, SmtpCommand::Ehlo(domain)) => {
                info!("EHLO from {}", domain);
                self.reset_transaction();
                self.state = SmtpState::Greeted;

                let mut response = format!("250-{} Hello {}\r\n", self.hostname, domain);
                response.push_str(&format!("250-SIZE {}\r\n", self.limits.max_message_size));
                response.push_str("250-8BITMIME\r\n");
                response.push_str("250 HELP\r\n");
                response
            }
            (SmtpState::Greeted, SmtpCommand::MailFrom(from)) => {
                debug!("MAIL FROM accepted");
                self.from = Some(from);
                self.to.clear();
                self.state = SmtpState::MailFrom;
                "250 OK\r\n".to_string()
            }
            (SmtpState::MailFrom | SmtpState::RcptTo, SmtpCommand::RcptTo(to)) => {
                if self.to.len() >= self.limits.max_recipients {
                    warn!("Too many recipients: {}", self.to.len());
                    format!(
                        "452 Too many recipients (max {})\r\n",
                        self.limits.max_recipients
                    )
                } else {
                    self.to.push(to);
                    self.state = SmtpState::RcptTo;
                    "250 OK\r\n".to_string()
                }
            }
            (SmtpState::RcptTo, SmtpCommand::Data) => {
                debug!("DATA command received");
                self.state = SmtpState::Data;
                "354 Start mail input; end with <CRLF>.<CRLF>\r\n".to_string()
            }
            (_, SmtpCommand::Rset) => {
                debug!("RSET command");
                self.reset_transaction();
                "250 OK\r\n".to_string()
            }
            (_, SmtpCommand::Noop) => "250 OK\r\n".to_string(),
            (_, SmtpCommand::Quit) => {
                debug!("QUIT command");
                format!("221 {} closing connection\r\n", self.hostname)
            }
            (_, SmtpCommand::Unknown(cmd)) => {
                warn!("Unknown command: {}", cmd);
                self.error_count += 1;
                "502 Command not implemented\r\n".to_string()
            }
            _ => {
                warn!("Invalid command sequence");
                self.error_count += 1;
                "503 Bad sequence of commands\r\n".to_string()
            }
        }
    }

    /// Receive DATA lines until the terminating dot.
    ///
    /// Each line is kept as its own segment. Once the size limit is exceeded
    /// the rest of the payload is read and discarded so the session stays in
    /// sync with the client.
    async fn receive_data<S>(&mut self, buf_reader: &mut BufReader<S>) -> Result<DataOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut line = Vec::new();
        let mut too_large = false;

        loop {
            line.clear();

            let read_result = tokio::select! {
                _ = self.cancel.cancelled() => None,
                r = timeout(DATA_TIMEOUT, buf_reader.read_until(b'\n', &mut line)) => Some(r),
            };

            let n = match read_result {
                None => {
                    return Err(RelayError::Cancelled("Session cancelled during DATA".to_string()));
                }
                Some(Ok(Ok(n))) => n,
                Some(Ok(Err(e))) => {
                    error!("IO error during DATA: {}", e);
                    return Err(e.into());
                }
                Some(Err(_)) => {
                    warn!("DATA timeout");
                    return Err(RelayError::SmtpProtocol("Timeout during DATA".to_string()));
                }
            };

            if n == 0 {
                return Err(RelayError::SmtpProtocol(
                    "Connection closed during DATA".to_string(),
                ));
            }

            if line == b".\r\n" || line == b".\n" {
                debug!("End of DATA received, total size: {} bytes", self.data_size);
                break;
            }

            if too_large {
                continue;
            }

            // Transparency (RFC 5321 section 4.5.2)
            let content = match line.first() {
                Some(b'.') => &line[1..],
                _ => &line[..],
            };

            let new_size = self.data_size + content.len();
            if new_size > self.limits.max_message_size {
                warn!(
                    "Message too large: {} bytes (max {})",
                    new_size, self.limits.max_message_size
                );
                too_large = true;
                self.data.clear();
                continue;
            }

            self.data_size = new_size;
            self.data.push(Bytes::copy_from_slice(content));
        }

        if too_large {
            Ok(DataOutcome::TooLarge)
        } else {
            Ok(DataOutcome::Complete)
        }
    }

    /// Hand the completed transaction to the store under its own deadline
    async fn relay_transaction(&mut self) -> SmtpReply {
        let transaction = RawTransaction::new(
            self.peer,
            self.from.take(),
            std::mem::take(&mut self.to),
            std::mem::take(&mut self.data),
        );

        info!(
            "Transaction {} complete: {} bytes for {} recipient(s)",
            transaction.id(),
            transaction.len(),
            transaction.rcpt_to().len()
        );

        let tx_cancel = self.cancel.child_token();
        let deadline = {
            let token = tx_cancel.clone();
            let limit = self.limits.transaction_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                token.cancel();
            })
        };

        let reply = self.store.save(transaction, &tx_cancel).await;
        deadline.abort();

        reply
    }

    /// Drop the current transaction; a session that never greeted stays so
    fn reset_transaction(&mut self) {
        if self.state != SmtpState::Fresh {
            self.state = SmtpState::Greeted;
        }
        self.from = None;
        self.to.clear();
        self.data.clear();
        self.data_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::Mutex;

    /// Store that records every transaction and answers with a fixed reply
    struct RecordingStore {
        saved: Mutex<Vec<RawTransaction>>,
        reply: SmtpReply,
    }

    impl RecordingStore {
        fn new(reply: SmtpReply) -> Arc<Self> {
            Arc::new(Self {
                saved: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl MessageStore for RecordingStore {
        async fn save(&self, transaction: RawTransaction, _cancel: &CancellationToken) -> SmtpReply {
            self.saved.lock().await.push(transaction);
            self.reply.clone()
        }
    }

    struct TestClient {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl TestClient {
        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn reply(&mut self) -> String {
            let mut full = String::new();
            loop {
                let mut line = String::new();
                self.reader.read_line(&mut line).await.unwrap();
                full.push_str(&line);
                if line.len() < 4 || &line[3..4] == " " {
                    return full;
                }
            }
        }

        async fn command(&mut self, line: &str) -> String {
            self.send(line).await;
            self.reply().await
        }
    }

    fn start_session(
        store: Arc<dyn MessageStore>,
        limits: SessionLimits,
        cancel: CancellationToken,
    ) -> (TestClient, tokio::task::JoinHandle<Result<()>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = SmtpSession::new("relay.test".to_string(), store, limits, cancel);
        let handle = tokio::spawn(session.handle(server));

        let (reader, writer) = tokio::io::split(client);
        (
            TestClient {
                reader: BufReader::new(reader),
                writer,
            },
            handle,
        )
    }

    #[tokio::test]
    async fn test_full_transaction_reaches_store() {
        let store = RecordingStore::new(SmtpReply::accepted(Some("id-1")));
        let (mut client, handle) =
            start_session(store.clone(), SessionLimits::default(), CancellationToken::new());

        assert!(client.reply().await.starts_with("220 relay.test"));
        let ehlo = client.command("EHLO client.test").await;
        assert!(ehlo.contains("250-SIZE"));
        assert!(ehlo.ends_with("250 HELP\r\n"));

        assert!(client.command("MAIL FROM:<a@x.com>").await.starts_with("250"));
        assert!(client.command("RCPT TO:<b@x.com>").await.starts_with("250"));
        assert!(client.command("RCPT TO:<c@x.com>").await.starts_with("250"));
        assert!(client.command("DATA").await.starts_with("354"));

        client.send("Subject: S").await;
        client.send("").await;
        client.send("..leading dot").await;
        let reply = client.command(".").await;
        assert_eq!(reply, "250 2.0.0 OK: queued as id-1\r\n");

        assert!(client.command("QUIT").await.starts_with("221"));
        handle.await.unwrap().unwrap();

        let saved = store.saved.lock().await;
        assert_eq!(saved.len(), 1);
        let tx = &saved[0];
        assert_eq!(tx.mail_from(), Some("a@x.com"));
        assert_eq!(tx.rcpt_to(), ["b@x.com".to_string(), "c@x.com".to_string()]);
        assert_eq!(tx.segments().len(), 3);
        assert_eq!(&tx.segments()[2][..], b".leading dot\r\n");
    }

    #[tokio::test]
    async fn test_store_reply_is_forwarded() {
        let store = RecordingStore::new(SmtpReply::try_again_later());
        let (mut client, _handle) =
            start_session(store, SessionLimits::default(), CancellationToken::new());

        client.reply().await;
        client.command("HELO client.test").await;
        client.command("MAIL FROM:<a@x.com>").await;
        client.command("RCPT TO:<b@x.com>").await;
        client.command("DATA").await;
        client.send("Subject: S").await;
        let reply = client.command(".").await;
        assert!(reply.starts_with("451 4.3.0"));
    }

    #[tokio::test]
    async fn test_data_before_rcpt_is_rejected() {
        let store = RecordingStore::new(SmtpReply::accepted(None));
        let (mut client, _handle) =
            start_session(store.clone(), SessionLimits::default(), CancellationToken::new());

        client.reply().await;
        client.command("EHLO client.test").await;
        assert!(client.command("DATA").await.starts_with("503"));
        assert!(client.command("MAIL FROM:<a@x.com>").await.starts_with("250"));
        assert!(client.command("DATA").await.starts_with("503"));
        assert!(store.saved.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_recipient_limit() {
        let store = RecordingStore::new(SmtpReply::accepted(None));
        let limits = SessionLimits {
            max_recipients: 1,
            ..Default::default()
        };
        let (mut client, _handle) = start_session(store, limits, CancellationToken::new());

        client.reply().await;
        client.command("EHLO client.test").await;
        client.command("MAIL FROM:<a@x.com>").await;
        assert!(client.command("RCPT TO:<b@x.com>").await.starts_with("250"));
        assert!(client.command("RCPT TO:<c@x.com>").await.starts_with("452"));
    }

    #[tokio::test]
    async fn test_oversized_message_is_discarded() {
        let store = RecordingStore::new(SmtpReply::accepted(None));
        let limits = SessionLimits {
            max_message_size: 16,
            ..Default::default()
        };
        let (mut client, _handle) = start_session(store.clone(), limits, CancellationToken::new());

        client.reply().await;
        client.command("EHLO client.test").await;
        client.command("MAIL FROM:<a@x.com>").await;
        client.command("RCPT TO:<b@x.com>").await;
        client.command("DATA").await;
        client.send("Subject: a subject longer than sixteen bytes").await;
        client.send("more").await;
        assert!(client.command(".").await.starts_with("552"));

        // Session is still usable afterwards
        assert!(client.command("NOOP").await.starts_with("250"));
        assert!(store.saved.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_rset_clears_transaction() {
        let store = RecordingStore::new(SmtpReply::accepted(None));
        let (mut client, _handle) =
            start_session(store, SessionLimits::default(), CancellationToken::new());

        client.reply().await;
        client.command("EHLO client.test").await;
        client.command("MAIL FROM:<a@x.com>").await;
        client.command("RCPT TO:<b@x.com>").await;
        assert!(client.command("RSET").await.starts_with("250"));
        assert!(client.command("DATA").await.starts_with("503"));
    }

    #[tokio::test]
    async fn test_mail_requires_greeting() {
        let store = RecordingStore::new(SmtpReply::accepted(None));
        let (mut client, _handle) =
            start_session(store, SessionLimits::default(), CancellationToken::new());

        client.reply().await;
        assert!(client.command("RSET").await.starts_with("250"));
        assert!(client.command("MAIL FROM:<a@x.com>").await.starts_with("503"));
        client.command("HELO client.test").await;
        assert!(client.command("MAIL FROM:<>").await.starts_with("250"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let store = RecordingStore::new(SmtpReply::accepted(None));
        let cancel = CancellationToken::new();
        let (mut client, handle) = start_session(store, SessionLimits::default(), cancel.clone());

        client.reply().await;
        cancel.cancel();
        assert!(client.reply().await.starts_with("421"));
        handle.await.unwrap().unwrap();
    }
}
