//! Blocking SocketCAN bindings for the sender and receiver traits

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use snafu::Snafu;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Socket, SocketOptions};

pub use socketcan::CanFilter;

use crate::messages::{CanId, CanMessage};
use crate::traits::{CanReceiver, CanSender};

fn socket_id_to_can_id(id: socketcan::Id) -> CanId {
    match id {
        socketcan::Id::Standard(id) => CanId::Std(id.as_raw()),
        socketcan::Id::Extended(id) => CanId::Extended(id.as_raw()),
    }
}

fn can_id_to_socket_id(id: CanId) -> socketcan::Id {
    match id {
        CanId::Std(id) => socketcan::StandardId::new(id).unwrap().into(),
        CanId::Extended(id) => socketcan::ExtendedId::new(id).unwrap().into(),
    }
}

/// Error frames carry no routable payload and are dropped here
fn frame_to_message(frame: CanFrame) -> Option<CanMessage> {
    match frame {
        CanFrame::Data(frame) => Some(CanMessage::new(socket_id_to_can_id(frame.id()), frame.data())),
        CanFrame::Remote(frame) => Some(CanMessage::new_rtr(socket_id_to_can_id(frame.id()))),
        CanFrame::Error(_) => None,
    }
}

fn message_to_frame(msg: &CanMessage) -> CanFrame {
    let id = can_id_to_socket_id(msg.id());
    if msg.is_rtr() {
        CanFrame::new_remote(id, msg.dlc as usize).unwrap()
    } else {
        CanFrame::new(id, msg.data()).unwrap()
    }
}

/// Error receiving from a SocketCAN socket
#[derive(Debug, Snafu)]
pub enum ReceiveError {
    /// Reading from the socket failed
    #[snafu(display("socket read failed: {source}"))]
    Io {
        /// The underlying I/O error
        source: std::io::Error,
    },
}

/// The receive half of a shared SocketCAN socket
#[derive(Debug, Clone)]
pub struct SocketCanReceiver {
    socket: Arc<CanSocket>,
}

impl CanReceiver for SocketCanReceiver {
    type Error = ReceiveError;

    fn try_recv(&mut self) -> Option<CanMessage> {
        match self.socket.read_frame_timeout(Duration::ZERO) {
            Ok(frame) => frame_to_message(frame),
            Err(_) => None,
        }
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanMessage>, ReceiveError> {
        match self.socket.read_frame_timeout(timeout) {
            Ok(frame) => Ok(frame_to_message(frame)),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(source) => Err(ReceiveError::Io { source }),
        }
    }
}

/// The transmit half of a shared SocketCAN socket
#[derive(Debug, Clone)]
pub struct SocketCanSender {
    socket: Arc<CanSocket>,
}

impl CanSender for SocketCanSender {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanMessage> {
        let frame = message_to_frame(&msg);
        self.socket.write_frame(&frame).map_err(|_| msg)
    }
}

/// Open a SocketCAN device and split it into a sender and a receiver
///
/// # Arguments
/// * `device` - The name of the SocketCAN device to open, e.g. "vcan0" or "can0"
/// * `filters` - Optional receive filters to install on the socket
///
/// Both halves share one socket, so the receiver does not see messages sent
/// by the sender.
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
    filters: Option<&[CanFilter]>,
) -> Result<(SocketCanSender, SocketCanReceiver), std::io::Error> {
    let socket = CanSocket::open(device.as_ref())?;
    if let Some(socket_filters) = filters {
        socket.set_filters(socket_filters)?;
    }
    let socket = Arc::new(socket);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender { socket };
    Ok((sender, receiver))
}
