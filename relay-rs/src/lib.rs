//! relay-rs: SMTP-to-HTTP email relay gateway
//!
//! Accepts mail over SMTP and forwards each message to the SendGrid v3 mail
//! send API, answering the SMTP client only once the provider has accepted
//! or refused the message.
//!
//! # Pipeline
//!
//! Every completed DATA payload becomes a [`smtp::RawTransaction`] that the
//! [`relay::Relay`] drives through parsing, translation and delivery. Each
//! outcome maps onto exactly one SMTP reply:
//!
//! - provider accepted: `250`
//! - network error, timeout, provider 4xx, cancellation: `451`
//! - malformed message, provider 5xx, rejected credential or payload: `554`
//!
//! # Example
//!
//! ```no_run
//! use relay_rs::config::Config;
//! use relay_rs::delivery::SendGridClient;
//! use relay_rs::relay::Relay;
//! use relay_rs::smtp::RelayServer;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let client = SendGridClient::from_config(&config.delivery)?;
//!     let relay = Arc::new(Relay::new(Arc::new(client)));
//!
//!     let server = RelayServer::bind(&config, relay).await?;
//!     server.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`delivery`]: Outbound message model and SendGrid client
//! - [`error`]: Error types and their SMTP replies
//! - [`mime`]: MIME parsing
//! - [`relay`]: Header filter, mappers, translator and orchestrator
//! - [`smtp`]: SMTP receiver and submission client

pub mod config;
pub mod delivery;
pub mod error;
pub mod mime;
pub mod relay;
pub mod smtp;

pub use error::{RelayError, Result};
