//! # Dispatcher
//!
//! Keyed publish/subscribe dispatch.
//!
//! Provides:
//! - [`MessageDispatcher`]: queue + explicit `dispatch()` on the caller's thread
//! - [`AsyncMessageDispatcher`]: queue drained by a dedicated worker thread
//!
//! Both route a `(key, Message)` pair to every live handler registered
//! under `key`, in registration order, FIFO per drained batch.

pub mod async_dispatcher;
pub mod dispatcher;
pub mod error;
pub mod metrics;
mod registry;

pub use async_dispatcher::AsyncMessageDispatcher;
pub use contracts::{
    DispatcherConfig, HandlerError, HandlerFailurePolicy, Message, MessageHandler, Payload,
};
pub use dispatcher::MessageDispatcher;
pub use error::DispatchError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
