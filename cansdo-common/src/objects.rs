//! Object dictionary addressing

/// A reference to an entry in a remote node's object dictionary
///
/// The entry's value is an opaque byte string as far as the SDO layer is
/// concerned; this type only carries its address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// The 16-bit object index
    pub index: u16,
    /// The 8-bit sub-index within the object
    pub sub_index: u8,
}

impl ObjectEntry {
    /// Create an entry reference
    pub const fn new(index: u16, sub_index: u8) -> Self {
        Self { index, sub_index }
    }
}

/// Object indices for standard objects
pub mod object_ids {
    /// The device name object index
    pub const DEVICE_NAME: u16 = 0x1008;
    /// The identity object index
    pub const IDENTITY: u16 = 0x1018;
    /// The first SDO server parameter object index
    ///
    /// Sub 1 holds the client-to-server COB-ID, sub 2 the server-to-client
    /// COB-ID.
    pub const SDO_SERVER_PARAMS: u16 = 0x1200;
}
