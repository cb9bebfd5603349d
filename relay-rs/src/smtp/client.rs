//! Minimal SMTP submission client
//!
//! Used by the `relay-send` tool and the integration tests to push a message
//! through a running gateway.

use crate::error::{RelayError, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error, info};

/// SMTP client submitting one message per connection
///
/// # Examples
/// ```no_run
/// use relay_rs::smtp::SmtpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SmtpClient::new("127.0.0.1:2525".to_string());
/// let reply = client.send_mail(
///     "sender@example.com",
///     &["recipient@other.com".to_string()],
///     b"Subject: Test\r\n\r\nHello!",
/// ).await?;
/// assert!(reply.starts_with("250"));
/// # Ok(())
/// # }
/// ```
pub struct SmtpClient {
    server_addr: String,
}

impl SmtpClient {
    pub fn new(server_addr: String) -> Self {
        Self { server_addr }
    }

    /// Send a message and return the server's reply to the end of DATA.
    ///
    /// The final reply is returned whatever its code; only failures before
    /// the payload was accepted for processing are reported as errors.
    pub async fn send_mail(&self, from: &str, recipients: &[String], data: &[u8]) -> Result<String> {
        info!(
            "Submitting message to {} recipient(s) via {}",
            recipients.len(),
            self.server_addr
        );

        let stream = TcpStream::connect(&self.server_addr).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let greeting = self.read_response(&mut reader).await?;
        Self::expect(&greeting, "220")?;

        self.write_line(&mut writer, &format!("EHLO {}", self.get_hostname()))
            .await?;
        Self::expect(&self.read_response(&mut reader).await?, "250")?;

        self.write_line(&mut writer, &format!("MAIL FROM:<{}>", from))
            .await?;
        Self::expect(&self.read_response(&mut reader).await?, "250")?;

        for rcpt in recipients {
            self.write_line(&mut writer, &format!("RCPT TO:<{}>", rcpt))
                .await?;
            Self::expect(&self.read_response(&mut reader).await?, "250")?;
        }

        self.write_line(&mut writer, "DATA").await?;
        Self::expect(&self.read_response(&mut reader).await?, "354")?;

        writer.write_all(&Self::dot_stuff(data)).await?;
        writer.write_all(b".\r\n").await?;

        let reply = self.read_response(&mut reader).await?;

        self.write_line(&mut writer, "QUIT").await?;
        let _ = self.read_response(&mut reader).await;

        Ok(reply.trim_end().to_string())
    }

    /// Normalize line endings to CRLF and escape leading dots
    fn dot_stuff(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() + 64);

        for line in data.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }

        // A trailing newline in the input produces one empty line too many
        if data.ends_with(b"\n") {
            out.truncate(out.len() - 2);
        }

        out
    }

    fn expect(response: &str, code: &str) -> Result<()> {
        if response.starts_with(code) {
            Ok(())
        } else {
            error!("Unexpected response: {}", response.trim_end());
            Err(RelayError::SmtpProtocol(format!(
                "Expected {}, got: {}",
                code,
                response.trim_end()
            )))
        }
    }

    /// Read a possibly multi-line response
    async fn read_response<R>(&self, reader: &mut BufReader<R>) -> Result<String>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut full_response = String::new();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Err(RelayError::SmtpProtocol(
                    "Connection closed by server".to_string(),
                ));
            }
            debug!("< {}", line.trim_end());

            full_response.push_str(&line);

            // Last line has a space after the code
            if line.len() < 4 || &line[3..4] == " " {
                break;
            }
        }

        Ok(full_response)
    }

    async fn write_line<W>(&self, writer: &mut W, line: &str) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        debug!("> {}", line);
        writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
        Ok(())
    }

    fn get_hostname(&self) -> String {
        gethostname::gethostname()
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SmtpClient::new("mail.example.com:25".to_string());
        assert_eq!(client.server_addr, "mail.example.com:25");
    }

    #[test]
    fn test_dot_stuff_escapes_leading_dots() {
        let stuffed = SmtpClient::dot_stuff(b"Subject: x\n\n.hidden\nend\n");
        assert_eq!(stuffed, b"Subject: x\r\n\r\n..hidden\r\nend\r\n");
    }

    #[test]
    fn test_dot_stuff_terminates_last_line() {
        let stuffed = SmtpClient::dot_stuff(b"a\r\nb");
        assert_eq!(stuffed, b"a\r\nb\r\n");
    }
}
