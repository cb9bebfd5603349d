//! SMTP transport layer (RFC 5321)
//!
//! Just enough ESMTP to receive mail and hand it to the relay:
//! - [`server`]: listener accepting incoming connections
//! - [`session`]: per-connection state machine
//! - [`commands`]: SMTP command parsing
//! - [`transaction`]: completed transactions and the [`MessageStore`] capability
//! - [`reply`]: SMTP replies returned at the end of DATA
//! - [`client`]: submission client used by tooling and tests

pub mod client;
pub mod commands;
pub mod reply;
pub mod server;
pub mod session;
pub mod transaction;

pub use client::SmtpClient;
pub use commands::SmtpCommand;
pub use reply::{ReplyClass, SmtpReply};
pub use server::RelayServer;
pub use session::{SessionLimits, SmtpSession};
pub use transaction::{MessageStore, RawTransaction};
