//! # Contracts
//!
//! Shared interface contracts for the message bus crates.
//! Every other crate depends on this one; reverse dependencies are prohibited.
//!
//! ## Delivery Model
//! - Messages are routed by string key
//! - A message carries at most one tagged [`Payload`]
//! - Handlers are held weakly by dispatchers, see [`MessageHandler`]

mod config;
mod error;
mod handler;
mod message;

pub use config::*;
pub use error::*;
pub use handler::MessageHandler;
pub use message::{Message, Payload, PayloadKind};
