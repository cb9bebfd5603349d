//! Relay core: translation of parsed mail into provider messages and the
//! per-transaction pipeline around it

pub mod filter;
pub mod mapper;
pub mod orchestrator;
pub mod translator;

pub use filter::HeaderFilter;
pub use mapper::{map_address, map_attachment};
pub use orchestrator::{Relay, RelayOutcome, RelayState};
pub use translator::Translator;
