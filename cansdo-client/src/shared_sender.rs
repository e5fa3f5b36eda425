//! Utility for sharing a single bus sender among threads

use std::sync::{Arc, Mutex};

use cansdo_common::traits::CanSender;
use cansdo_common::CanMessage;

/// A cloneable wrapper sharing one [`CanSender`] among threads
///
/// Useful when several clients on the same bus should transmit through one
/// physical socket.
#[derive(Debug)]
pub struct SharedSender<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedSender<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: CanSender> SharedSender<S> {
    /// Wrap a sender for shared use
    pub fn new(sender: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sender)),
        }
    }
}

impl<S: CanSender> CanSender for SharedSender<S> {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanMessage> {
        self.inner.lock().unwrap().send(msg)
    }
}
