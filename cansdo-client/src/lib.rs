//! A blocking SDO client for CANopen devices
//!
//! The crate provides:
//!
//! - An [SDO client](SdoClient) with blocking `read`/`write` access to a
//!   remote node's object dictionary, driven under the hood by a reactive
//!   state machine that a bus listener advances frame by frame
//! - A [FrameRouter] that owns the receive side of a CAN interface and fans
//!   frames out to per-COB-ID listeners
//! - A [SharedSender] for sharing one transmit socket between clients and
//!   threads
//!
//! One client instance runs at most one transfer at a time; concurrent
//! callers serialize on the client, and a caller that cannot acquire it
//! within two seconds fails with [`SdoClientError::Busy`].
#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]

mod frame_router;
mod sdo_client;
mod shared_sender;

pub use cansdo_common as common;

pub use frame_router::{FrameRouter, ListenerHandle};
pub use sdo_client::{RawAbortCode, SdoClient, SdoClientError};
pub use shared_sender::SharedSender;
