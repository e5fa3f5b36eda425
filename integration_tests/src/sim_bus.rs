//! A simulated CAN bus for tests
//!
//! Every sender broadcasts to every receiver; consumers filter by COB-ID,
//! as they would on a real bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use cansdo_common::traits::{CanReceiver, CanSender};
use cansdo_common::CanMessage;

/// A broadcast bus; create any number of sender/receiver endpoints
pub struct SimBus {
    channels: Arc<Mutex<Vec<Sender<CanMessage>>>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn new_sender(&self) -> SimBusSender {
        SimBusSender {
            channels: self.channels.clone(),
        }
    }

    pub fn new_receiver(&self) -> SimBusReceiver {
        let (tx, rx) = unbounded();
        self.channels.lock().unwrap().push(tx);
        SimBusReceiver { rx }
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct SimBusSender {
    channels: Arc<Mutex<Vec<Sender<CanMessage>>>>,
}

impl CanSender for SimBusSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanMessage> {
        let mut channels = self.channels.lock().unwrap();
        channels.retain(|tx| tx.send(msg).is_ok());
        Ok(())
    }
}

/// The bus side has shut down
#[derive(Debug, Clone, Copy)]
pub struct BusClosed;

pub struct SimBusReceiver {
    rx: Receiver<CanMessage>,
}

impl CanReceiver for SimBusReceiver {
    type Error = BusClosed;

    fn try_recv(&mut self) -> Option<CanMessage> {
        self.rx.try_recv().ok()
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanMessage>, BusClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BusClosed),
        }
    }
}
