//! Seipipe — pipe adapters bridging a chat UI to external agent backends.
//!
//! Each pipe forwards the latest user message of a conversation to one
//! backend, relays the textual reply back into the transcript, and emits
//! rate-limited status notifications to the host while doing so.
//!
//! Three backends are supported:
//! - [`pipe::defi::DefiAgentPipe`] — DeFi agent chat API (single-shot, streaming or not)
//! - [`pipe::messaging::MessagingAgentPipe`] — multi-agent messaging server
//! - [`pipe::flow::FlowAgentPipe`] — low-code agent-flow server
//!
//! See `DESIGN.md` for architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod conversation;
pub mod logging;
pub mod notify;
pub mod pipe;
