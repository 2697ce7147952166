//! Block and transaction push channels.
//!
//! Each channel holds at most one handler. Replacing it is atomic with
//! respect to delivery: an item is handed to either the old handler or the
//! new one, never both and never neither.

use crate::domain::PushHandler;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct PushChannel<T> {
    name: &'static str,
    handler: Mutex<Option<Arc<Mutex<PushHandler<T>>>>>,
}

impl<T> PushChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handler: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Install `handler`, dropping any previous one.
    pub fn replace(&self, handler: PushHandler<T>) {
        *self.handler.lock() = Some(Arc::new(Mutex::new(handler)));
    }

    pub fn clear(&self) {
        *self.handler.lock() = None;
    }

    pub fn is_installed(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Hand `item` to the installed handler.
    ///
    /// The handler runs without the slot lock held, so it may install a
    /// replacement for the next item.
    pub fn dispatch(&self, item: T) -> bool {
        let current = self.handler.lock().clone();
        match current {
            Some(handler) => {
                let mut handler = handler.lock();
                (*handler)(item);
                true
            }
            None => false,
        }
    }
}
