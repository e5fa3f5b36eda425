//! Wire-level CANopen types shared by SDO peers
//!
//! This crate holds the pieces of the SDO protocol that do not depend on
//! which side of the bus you are on: CAN message and identifier types, the
//! SDO frame codec, the abort-code catalogue, and the trait seams a client
//! uses to reach a CAN interface and a local object dictionary cache.
//!
//! The crate builds without `std` when the default `std` feature is
//! disabled; the optional `socketcan` feature adds blocking Linux SocketCAN
//! bindings for the
//! [`CanSender`](traits::CanSender) and [`CanReceiver`](traits::CanReceiver)
//! traits.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod messages;
pub mod node_id;
pub mod objects;
pub mod sdo;
pub mod traits;

#[cfg(feature = "socketcan")]
mod socketcan;

#[cfg(feature = "socketcan")]
pub use socketcan::{open_socketcan, CanFilter, ReceiveError, SocketCanReceiver, SocketCanSender};

pub use messages::{CanId, CanMessage, SdoCobId};
pub use node_id::NodeId;
pub use objects::ObjectEntry;
