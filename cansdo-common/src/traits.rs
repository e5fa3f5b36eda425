//! Common traits

use core::time::Duration;

use crate::messages::CanMessage;

/// A synchronous CAN sender
pub trait CanSender {
    /// Enqueue a message for transmission
    ///
    /// Returns the message back on failure. Implementations must not block
    /// beyond a bounded enqueue.
    fn send(&mut self, msg: CanMessage) -> Result<(), CanMessage>;
}

/// A synchronous CAN receiver
pub trait CanReceiver {
    /// The error type returned by recv
    type Error: core::fmt::Debug + Send;

    /// Receive an available message immediately, if there is one
    fn try_recv(&mut self) -> Option<CanMessage>;

    /// A blocking receive
    ///
    /// Returns `Ok(None)` when `timeout` elapses without a message. An `Err`
    /// means the receiver is broken and will not produce further messages.
    fn recv(&mut self, timeout: Duration) -> Result<Option<CanMessage>, Self::Error>;

    /// Remove any pending messages from the receiver
    fn flush(&mut self) {
        while self.try_recv().is_some() {}
    }
}

/// Snapshot access to locally cached object dictionary values
///
/// An SDO client resolves its COB-IDs from the local copy of the server's
/// communication parameters. Only a cached read is required; the cache must
/// not touch the bus.
pub trait ObjectCache {
    /// The cached value of `{index, sub_index}`, or `None` if the entry is
    /// not present in the cache
    fn get_cached(&self, index: u16, sub_index: u8) -> Option<u32>;
}
