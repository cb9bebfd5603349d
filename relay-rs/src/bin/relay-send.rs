//! Submit a test message to a running relay
//!
//! The message carries a plain-text body and a `text/plain` attachment, which
//! is enough to exercise parsing, translation and delivery end to end.
//!
//! # Usage
//!
//! ```bash
//! relay-send --server 127.0.0.1:2525 --from me@example.com --to you@example.com
//! ```

use base64::{engine::general_purpose, Engine as _};
use clap::Parser;
use relay_rs::smtp::SmtpClient;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "relay-send")]
#[command(about = "Send a test message with an attachment through the relay", long_about = None)]
struct Cli {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:2525")]
    server: String,

    /// Sender address
    #[arg(short, long)]
    from: String,

    /// Recipient addresses
    #[arg(short, long, required = true)]
    to: Vec<String>,

    #[arg(long, default_value = "Relay test message")]
    subject: String,

    /// Attachment file name
    #[arg(long, default_value = "Text.txt")]
    attachment_name: String,

    /// Attachment content
    #[arg(long, default_value = "Body Text")]
    attachment_text: String,
}

fn build_message(cli: &Cli) -> String {
    let boundary = format!("relay-send-{}", Uuid::new_v4().simple());
    let encoded = general_purpose::STANDARD.encode(cli.attachment_text.as_bytes());

    let mut message = String::new();
    message.push_str(&format!("From: {}\r\n", cli.from));
    message.push_str(&format!("To: {}\r\n", cli.to.join(", ")));
    message.push_str(&format!("Subject: {}\r\n", cli.subject));
    message.push_str(&format!("Message-ID: <{}@relay-send>\r\n", Uuid::new_v4()));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
        boundary
    ));

    message.push_str(&format!("--{}\r\n", boundary));
    message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
    message.push_str("Test message sent by relay-send.\r\n");

    message.push_str(&format!("--{}\r\n", boundary));
    message.push_str(&format!(
        "Content-Type: text/plain; name=\"{}\"\r\n",
        cli.attachment_name
    ));
    message.push_str(&format!(
        "Content-Disposition: attachment; filename=\"{}\"\r\n",
        cli.attachment_name
    ));
    message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    message.push_str(&encoded);
    message.push_str("\r\n");
    message.push_str(&format!("--{}--\r\n", boundary));

    message
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let message = build_message(&cli);
    println!("Sending test message to {} via {}", cli.to.join(", "), cli.server);

    let client = SmtpClient::new(cli.server.clone());
    let reply = client
        .send_mail(&cli.from, &cli.to, message.as_bytes())
        .await?;

    println!("Relay replied: {}", reply.trim_end());
    if !reply.starts_with('2') {
        std::process::exit(1);
    }

    Ok(())
}
