//! HTTP implementation of the message backend contract.
//!
//! Talks JSON to the REST backend with `ureq`, off the caller's thread, and
//! converts every transport, status and parse failure into a
//! [`waymark_core::MessageError`] before it reaches the core.

pub mod http;
pub mod wire;

pub use http::{API_KEY_HEADER, GatewayConfig, GatewayError, HttpBackend, HttpGateway};
pub use wire::{WireMessage, parse_message_array};
