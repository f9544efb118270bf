//! MessageHandler trait - Dispatcher delivery interface

use crate::{HandlerError, Message};

/// Subscriber capability
///
/// Dispatchers keep only weak references to registered handlers: a handler
/// that is dropped stops receiving messages without having to unregister.
/// State that changes on delivery needs interior mutability, since the same
/// handler may be registered under several keys and, for the asynchronous
/// dispatcher, is called from the worker thread.
pub trait MessageHandler {
    /// Called once per delivered message whose key the handler is registered under
    ///
    /// # Errors
    /// Returned errors are propagated by the synchronous dispatcher and
    /// handled according to the failure policy by the asynchronous one.
    fn on_message(&self, key: &str, message: &Message) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &Message) -> Result<(), HandlerError>,
{
    fn on_message(&self, key: &str, message: &Message) -> Result<(), HandlerError> {
        self(key, message)
    }
}
