//! Prompt forwarding for model-relay.
//!
//! The core operation is [`runtime::Forwarder::forward`]: wrap a prompt in a chat envelope,
//! POST it to a hosted model with a bearer token, and unwrap `choices[0].message.content`
//! from the reply. Everything else in this crate exists to feed that call:
//! - [`catalog`] describes which backends exist and where their configuration lives
//! - [`tabular`] turns CSV files into JSON rows for the CSV backend
//!
//! This crate intentionally knows nothing about MCP framing; the server crate owns that.

pub mod catalog;
pub mod envelope;
pub mod error;
pub mod runtime;
pub mod safety;
pub mod tabular;

pub use catalog::{BackendKind, CatalogConfig, EndpointConfig, ResolvedBackend};
pub use error::{ForwardError, MalformedReason};
pub use runtime::Forwarder;
