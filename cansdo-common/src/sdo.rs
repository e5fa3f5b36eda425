//! SDO protocol frames and abort codes
//!
//! Every SDO frame is exactly 8 bytes. Byte 0 carries the command specifier
//! in bits 5-7 plus per-frame flag bits; multi-byte fields are little
//! endian. Frames are modeled as tagged enums with named fields, one for
//! each direction: [`SdoRequest`] (client to server) and [`SdoResponse`]
//! (server to client).
use int_enum::IntEnum;

use crate::messages::{CanId, CanMessage};

/// Specifies the possible server command specifier (SCS) values in SDO
/// response packets
enum ServerCommand {
    SegmentUpload = 0,
    SegmentDownload = 1,
    Upload = 2,
    Download = 3,
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerCommand::*;
        match value {
            0 => Ok(SegmentUpload),
            1 => Ok(SegmentDownload),
            2 => Ok(Upload),
            3 => Ok(Download),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// Specifies the possible client command specifier (CCS) values in SDO
/// request packets
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u8)]
enum ClientCommand {
    DownloadSegment = 0,
    InitiateDownload = 1,
    InitiateUpload = 2,
    ReqUploadSegment = 3,
    Abort = 4,
}

impl TryFrom<u8> for ClientCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ClientCommand::*;
        match value {
            0 => Ok(DownloadSegment),
            1 => Ok(InitiateDownload),
            2 => Ok(InitiateUpload),
            3 => Ok(ReqUploadSegment),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// SDO Abort Code
///
/// Defines the reasons an SDO transfer can be aborted. The block-mode codes
/// are part of the catalogue even though block transfers themselves are not
/// implemented; servers may still quote them.
#[derive(Clone, Copy, Debug, PartialEq, IntEnum)]
#[repr(u32)]
pub enum AbortCode {
    /// Toggle bit not alternated
    ToggleNotAlternated = 0x0503_0000,
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Invalid block size (block mode only)
    InvalidBlockSize = 0x0504_0002,
    /// Invalid sequence number (block mode only)
    InvalidSequenceNumber = 0x0504_0003,
    /// CRC Error (block mode only)
    CrcError = 0x0504_0004,
    /// Out of memory
    OutOfMemory = 0x0504_0005,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    NoSuchObject = 0x0602_0000,
    /// Object cannot be mapped to the PDO
    UnallowedPdo = 0x0604_0041,
    /// The number and length of objects would exceed PDO length
    PdoTooLong = 0x0604_0042,
    /// General parameter incompatibility
    IncompatibleParameter = 0x0604_0043,
    /// General internal incompatibility in the device
    IncompatibleDevice = 0x0604_0047,
    /// Access failed due to hardware error
    HardwareError = 0x0606_0000,
    /// Data type does not match, length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Data type does not match, length of service parameter too high
    DataTypeMismatchLengthHigh = 0x0607_0012,
    /// Data type does not match, length of service parameter too low
    DataTypeMismatchLengthLow = 0x0607_0013,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// Invalid value for parameter (download only)
    InvalidValue = 0x0609_0030,
    /// Value of parameter too high (download only)
    ValueTooHigh = 0x0609_0031,
    /// Value of parameter too low (download only)
    ValueTooLow = 0x0609_0032,
    /// Maximum value is less than minimum value
    MaxLessThanMin = 0x0609_0036,
    /// Resource isn't available
    ResourceNotAvailable = 0x060A_0023,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
    /// Data cannot be transferred or stored to the application because of local control
    CantStoreLocalControl = 0x0800_0021,
    /// Data cannot be transferred or stored to the application because of the device state
    CantStoreDeviceState = 0x0800_0022,
    /// No object dictionary is present
    NoObjectDict = 0x0800_0023,
    /// No data available
    NoData = 0x0800_0024,
}

impl AbortCode {
    /// The catalogue text for this code
    pub fn description(&self) -> &'static str {
        use AbortCode::*;
        match self {
            ToggleNotAlternated => "Toggle bit not alternated.",
            SdoTimeout => "SDO protocol timed out.",
            InvalidCommandSpecifier => "Client/server command specifier not valid or unknown.",
            InvalidBlockSize => "Invalid block size (block mode only).",
            InvalidSequenceNumber => "Invalid sequence number (block mode only).",
            CrcError => "CRC error (block mode only).",
            OutOfMemory => "Out of memory.",
            UnsupportedAccess => "Unsupported access to an object.",
            WriteOnly => "Attempt to read a write only object.",
            ReadOnly => "Attempt to write a read only object.",
            NoSuchObject => "Object does not exist in the object dictionary.",
            UnallowedPdo => "Object cannot be mapped to the PDO.",
            PdoTooLong => {
                "The number and length of the objects to be mapped would exceed PDO length."
            }
            IncompatibleParameter => "General parameter incompatibility reason.",
            IncompatibleDevice => "General internal incompatibility in the device.",
            HardwareError => "Access failed due to an hardware error.",
            DataTypeMismatch => {
                "Data type does not match, length of service parameter does not match"
            }
            DataTypeMismatchLengthHigh => {
                "Data type does not match, length of service parameter too high"
            }
            DataTypeMismatchLengthLow => {
                "Data type does not match, length of service parameter too low"
            }
            NoSuchSubIndex => "Sub-index does not exist.",
            InvalidValue => "Invalid value for parameter (download only).",
            ValueTooHigh => "Value of parameter written too high (download only).",
            ValueTooLow => "Value of parameter written too low (download only).",
            MaxLessThanMin => "Maximum value is less than minimum value.",
            ResourceNotAvailable => "Resource not available: SDO connection",
            GeneralError => "General error",
            CantStore => "Data cannot be transferred or stored to the application.",
            CantStoreLocalControl => {
                "Data cannot be transferred or stored to the application because of local control."
            }
            CantStoreDeviceState => {
                "Data cannot be transferred or stored to the application because of the present device state."
            }
            NoObjectDict => {
                "Object dictionary dynamic generation fails or no object dictionary is present."
            }
            NoData => "No data available",
        }
    }
}

impl core::fmt::Display for AbortCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// The catalogue text for an arbitrary 32-bit abort code
///
/// Codes outside the catalogue answer with the reserved-code text, matching
/// how inbound abort frames from unknown servers are surfaced.
pub fn abort_code_text(code: u32) -> &'static str {
    AbortCode::try_from(code)
        .map(|code| code.description())
        .unwrap_or("Abort code is reserved")
}

/// Pack a 16-bit indicated size into an initiate payload
///
/// The size travels split across the first and last payload byte (frame
/// bytes 4 and 7), the convention this codec is wire-compatible with.
fn pack_indicated_size(size: u16) -> [u8; 4] {
    [size as u8, 0, 0, (size >> 8) as u8]
}

fn unpack_indicated_size(data: &[u8; 4]) -> usize {
    data[0] as usize | (data[3] as usize) << 8
}

/// An SDO request
///
/// The messages a client sends to a server.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SdoRequest {
    /// Begin a download, writing data to an object on the server
    InitiateDownload {
        /// Number of unused bytes in data (expedited only)
        n: u8,
        /// Expedited flag
        e: bool,
        /// Size-indicated flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Value when expedited, packed size when segmented and sized
        data: [u8; 4],
    },
    /// Send a segment of data to the server
    DownloadSegment {
        /// Toggle flag
        t: bool,
        /// Number of unused bytes in data
        n: u8,
        /// When set, indicates there are no more segments to be sent
        c: bool,
        /// Segment data
        data: [u8; 7],
    },
    /// Begin an upload of data from an object on the server
    InitiateUpload {
        /// The requested object index
        index: u16,
        /// The requested sub object
        sub: u8,
    },
    /// Request the next segment in an upload
    ReqUploadSegment {
        /// Toggle flag
        t: bool,
    },
    /// Sent by client to abort an ongoing transfer
    Abort {
        /// The object index of the active transfer
        index: u16,
        /// The sub object of the active transfer
        sub: u8,
        /// The abort reason
        abort_code: u32,
    },
}

impl SdoRequest {
    /// Create an abort message
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoRequest::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// Create a size-indicated segmented download request
    pub fn initiate_download(index: u16, sub: u8, size: u16) -> Self {
        SdoRequest::InitiateDownload {
            n: 0,
            e: false,
            s: true,
            index,
            sub,
            data: pack_indicated_size(size),
        }
    }

    /// Create an expedited download message
    ///
    /// Panics if `data` is longer than 4 bytes.
    pub fn expedited_download(index: u16, sub: u8, data: &[u8]) -> Self {
        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        SdoRequest::InitiateDownload {
            n: (4 - data.len()) as u8,
            e: true,
            s: true,
            index,
            sub,
            data: msg_data,
        }
    }

    /// Create a `DownloadSegment` request
    ///
    /// Panics if `segment_data` is longer than 7 bytes.
    pub fn download_segment(toggle: bool, last_segment: bool, segment_data: &[u8]) -> Self {
        let mut data = [0; 7];
        data[0..segment_data.len()].copy_from_slice(segment_data);
        SdoRequest::DownloadSegment {
            t: toggle,
            n: 7 - segment_data.len() as u8,
            c: last_segment,
            data,
        }
    }

    /// Create an `InitiateUpload` request
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// Create a `ReqUploadSegment` request
    pub fn upload_segment_request(toggle: bool) -> Self {
        SdoRequest::ReqUploadSegment { t: toggle }
    }

    /// The data size announced by an initiate download request, if any
    pub fn indicated_size(&self) -> Option<usize> {
        match self {
            SdoRequest::InitiateDownload { n, e, s, data, .. } => {
                if *e && *s {
                    Some(4 - *n as usize)
                } else if !*e && *s {
                    Some(unpack_indicated_size(data))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Convert the request to message payload bytes
    pub fn to_bytes(self) -> [u8; 8] {
        let mut payload = [0; 8];

        match self {
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = ((ClientCommand::InitiateDownload as u8) << 5)
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | s as u8;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoRequest::DownloadSegment { t, n, c, data } => {
                payload[0] = ((ClientCommand::DownloadSegment as u8) << 5)
                    | ((t as u8) << 4)
                    | ((n & 7) << 1)
                    | (c as u8);
                payload[1..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                payload[0] = (ClientCommand::InitiateUpload as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoRequest::ReqUploadSegment { t } => {
                payload[0] = ((ClientCommand::ReqUploadSegment as u8) << 5) | ((t as u8) << 4);
            }
            SdoRequest::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ClientCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        payload
    }

    /// Convert the request to a CanMessage using the provided COB ID
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let payload = self.to_bytes();
        CanMessage::new(id, &payload)
    }
}

impl TryFrom<&[u8]> for SdoRequest {
    type Error = AbortCode;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != 8 {
            return Err(AbortCode::GeneralError);
        }
        let ccs: ClientCommand = (value[0] >> 5)
            .try_into()
            .map_err(|_| AbortCode::InvalidCommandSpecifier)?;

        match ccs {
            ClientCommand::DownloadSegment => {
                let t = (value[0] & (1 << 4)) != 0;
                let n = (value[0] >> 1) & 0x7;
                let c = (value[0] & (1 << 0)) != 0;
                let data = value[1..8].try_into().unwrap();
                Ok(SdoRequest::DownloadSegment { t, n, c, data })
            }
            ClientCommand::InitiateDownload => {
                let n = (value[0] >> 2) & 0x3;
                let e = (value[0] & (1 << 1)) != 0;
                let s = (value[0] & (1 << 0)) != 0;
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                let data = value[4..8].try_into().unwrap();
                Ok(SdoRequest::InitiateDownload {
                    n,
                    e,
                    s,
                    index,
                    sub,
                    data,
                })
            }
            ClientCommand::InitiateUpload => {
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                Ok(SdoRequest::InitiateUpload { index, sub })
            }
            ClientCommand::ReqUploadSegment => {
                let t = ((value[0] >> 4) & 1) != 0;
                Ok(SdoRequest::ReqUploadSegment { t })
            }
            ClientCommand::Abort => {
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                let abort_code = u32::from_le_bytes(value[4..8].try_into().unwrap());
                Ok(SdoRequest::Abort {
                    index,
                    sub,
                    abort_code,
                })
            }
        }
    }
}

/// An SDO response
///
/// The messages a server sends back to a client.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SdoResponse {
    /// Response to an [`SdoRequest::InitiateUpload`]
    ConfirmUpload {
        /// Number of unused bytes in data (expedited only)
        n: u8,
        /// Expedited flag
        e: bool,
        /// Size-indicated flag
        s: bool,
        /// The index of the object being uploaded
        index: u16,
        /// The sub object being uploaded
        sub: u8,
        /// Value when expedited, packed size when segmented and sized
        data: [u8; 4],
    },
    /// An upload segment
    UploadSegment {
        /// The toggle bit
        t: bool,
        /// The number of unused bytes in data
        n: u8,
        /// Flag indicating this is the final segment
        c: bool,
        /// Object data
        data: [u8; 7],
    },
    /// Response to an [`SdoRequest::InitiateDownload`]
    ConfirmDownload {
        /// The index of the object to be written to
        index: u16,
        /// The sub object to be written to
        sub: u8,
    },
    /// Response to an [`SdoRequest::DownloadSegment`]
    ConfirmDownloadSegment {
        /// Toggle flag
        t: bool,
    },
    /// Sent by server to abort an ongoing transfer
    Abort {
        /// Object index of the active transfer
        index: u16,
        /// Sub object of the active transfer
        sub: u8,
        /// Abort reason
        abort_code: u32,
    },
}

impl TryFrom<CanMessage> for SdoResponse {
    type Error = ();

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        if msg.dlc != 8 {
            return Err(());
        }
        let command: ServerCommand = (msg.data[0] >> 5).try_into()?;
        match command {
            ServerCommand::SegmentUpload => {
                let t = (msg.data[0] & (1 << 4)) != 0;
                let n = (msg.data[0] >> 1) & 7;
                let c = (msg.data[0] & (1 << 0)) != 0;
                let data: [u8; 7] = msg.data[1..8].try_into().unwrap();
                Ok(SdoResponse::UploadSegment { t, n, c, data })
            }
            ServerCommand::SegmentDownload => {
                let t = (msg.data[0] & (1 << 4)) != 0;
                Ok(SdoResponse::ConfirmDownloadSegment { t })
            }
            ServerCommand::Upload => {
                let n = (msg.data[0] >> 2) & 0x3;
                let e = (msg.data[0] & (1 << 1)) != 0;
                let s = (msg.data[0] & (1 << 0)) != 0;
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                let data: [u8; 4] = msg.data[4..8].try_into().unwrap();
                Ok(SdoResponse::ConfirmUpload {
                    n,
                    e,
                    s,
                    index,
                    sub,
                    data,
                })
            }
            ServerCommand::Download => {
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                Ok(SdoResponse::ConfirmDownload { index, sub })
            }
            ServerCommand::Abort => {
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                let abort_code = u32::from_le_bytes(msg.data[4..8].try_into().unwrap());
                Ok(SdoResponse::Abort {
                    index,
                    sub,
                    abort_code,
                })
            }
        }
    }
}

impl SdoResponse {
    /// Create a `ConfirmUpload` response for an expedited upload
    ///
    /// Zero-length values are announced with the size flag cleared, since a
    /// count of four unused bytes does not fit the two-bit field.
    ///
    /// Panics if `data` is longer than 4 bytes.
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> SdoResponse {
        if data.len() > 4 {
            panic!("Cannot create expedited upload with more than 4 bytes");
        }

        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        let s;
        let n;
        if data.is_empty() {
            s = false;
            n = 0;
        } else {
            s = true;
            n = 4 - data.len() as u8;
        }
        SdoResponse::ConfirmUpload {
            index,
            sub,
            e: true,
            s,
            n,
            data: msg_data,
        }
    }

    /// Create a `ConfirmUpload` response for a segmented upload
    pub fn upload_acknowledge(index: u16, sub: u8, size: Option<u16>) -> SdoResponse {
        SdoResponse::ConfirmUpload {
            n: 0,
            e: false,
            s: size.is_some(),
            index,
            sub,
            data: pack_indicated_size(size.unwrap_or(0)),
        }
    }

    /// Create an `UploadSegment` response
    ///
    /// Panics if `data` is longer than 7 bytes.
    pub fn upload_segment(t: bool, c: bool, data: &[u8]) -> SdoResponse {
        let n = (7 - data.len()) as u8;
        let mut buf = [0; 7];
        buf[0..data.len()].copy_from_slice(data);
        SdoResponse::UploadSegment { t, n, c, data: buf }
    }

    /// Create a `ConfirmDownload` response
    pub fn download_acknowledge(index: u16, sub: u8) -> SdoResponse {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Create a `ConfirmDownloadSegment` response
    pub fn download_segment_acknowledge(t: bool) -> SdoResponse {
        SdoResponse::ConfirmDownloadSegment { t }
    }

    /// Create an abort response
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> SdoResponse {
        SdoResponse::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// The data size announced by an upload initiate response, if any
    pub fn indicated_size(&self) -> Option<usize> {
        match self {
            SdoResponse::ConfirmUpload { n, e, s, data, .. } => {
                if *e && *s {
                    Some(4 - *n as usize)
                } else if !*e && *s {
                    Some(unpack_indicated_size(data))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Convert the response to message payload bytes
    pub fn to_bytes(self) -> [u8; 8] {
        let mut payload = [0; 8];

        match self {
            SdoResponse::ConfirmUpload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = ((ServerCommand::Upload as u8) << 5)
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | (s as u8);
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                payload[0] = (ServerCommand::Download as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoResponse::UploadSegment { t, n, c, data } => {
                payload[0] = ((ServerCommand::SegmentUpload as u8) << 5)
                    | ((t as u8) << 4)
                    | ((n & 7) << 1)
                    | c as u8;
                payload[1..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownloadSegment { t } => {
                payload[0] = ((ServerCommand::SegmentDownload as u8) << 5) | ((t as u8) << 4);
            }
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ServerCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        payload
    }

    /// Convert the response to a [CanMessage] using the provided COB ID
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let payload = self.to_bytes();
        CanMessage::new(id, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(bytes: [u8; 8]) -> SdoResponse {
        SdoResponse::try_from(CanMessage::new(CanId::std(0x581), &bytes)).unwrap()
    }

    #[test]
    fn encode_initiate_upload() {
        let bytes = SdoRequest::initiate_upload(0x1018, 1).to_bytes();
        assert_eq!([0x40, 0x18, 0x10, 0x01, 0, 0, 0, 0], bytes);
    }

    #[test]
    fn decode_expedited_upload_response() {
        // 0x4B: upload response, expedited, sized, two unused bytes
        assert_eq!(
            SdoResponse::ConfirmUpload {
                n: 2,
                e: true,
                s: true,
                index: 0x1018,
                sub: 1,
                data: [0xFE, 0xCA, 0, 0],
            },
            resp([0x4B, 0x18, 0x10, 0x01, 0xFE, 0xCA, 0, 0])
        );
        assert_eq!(
            Some(2),
            resp([0x4B, 0x18, 0x10, 0x01, 0xFE, 0xCA, 0, 0]).indicated_size()
        );
    }

    #[test]
    fn encode_expedited_download() {
        let bytes = SdoRequest::expedited_download(0x1400, 2, &[0x01, 0x02, 0x03]).to_bytes();
        assert_eq!([0x27, 0x00, 0x14, 0x02, 0x01, 0x02, 0x03, 0x00], bytes);
    }

    #[test]
    fn encode_sized_initiate_download() {
        let request = SdoRequest::initiate_download(0x1008, 0, 9);
        assert_eq!([0x21, 0x08, 0x10, 0x00, 0x09, 0, 0, 0], request.to_bytes());
        assert_eq!(Some(9), request.indicated_size());

        // the size travels split across payload bytes 0 and 3
        let request = SdoRequest::initiate_download(0x1008, 0, 0x0102);
        assert_eq!([0x21, 0x08, 0x10, 0x00, 0x02, 0, 0, 0x01], request.to_bytes());
        assert_eq!(Some(0x0102), request.indicated_size());
    }

    #[test]
    fn segment_flag_bits() {
        // toggle=1, done=1, two used bytes -> five unused
        let bytes = SdoRequest::download_segment(true, true, &[0x48, 0x49]).to_bytes();
        assert_eq!([0x1B, 0x48, 0x49, 0, 0, 0, 0, 0], bytes);

        // full segment, toggle=0, not last
        let bytes = SdoRequest::download_segment(false, false, &[1, 2, 3, 4, 5, 6, 7]).to_bytes();
        assert_eq!([0x00, 1, 2, 3, 4, 5, 6, 7], bytes);

        // the server side mirrors the layout
        assert_eq!(
            SdoResponse::UploadSegment {
                t: true,
                n: 5,
                c: true,
                data: [0x48, 0x49, 0, 0, 0, 0, 0],
            },
            resp([0x1B, 0x48, 0x49, 0, 0, 0, 0, 0])
        );
    }

    #[test]
    fn upload_segment_request_toggle() {
        assert_eq!(
            [0x60, 0, 0, 0, 0, 0, 0, 0],
            SdoRequest::upload_segment_request(false).to_bytes()
        );
        assert_eq!(
            [0x70, 0, 0, 0, 0, 0, 0, 0],
            SdoRequest::upload_segment_request(true).to_bytes()
        );
    }

    #[test]
    fn abort_roundtrip() {
        let bytes = SdoRequest::abort(0x1400, 2, AbortCode::ToggleNotAlternated).to_bytes();
        assert_eq!([0x80, 0x00, 0x14, 0x02, 0x00, 0x00, 0x03, 0x05], bytes);

        assert_eq!(
            SdoResponse::Abort {
                index: 0x1400,
                sub: 2,
                abort_code: 0x0800_0022,
            },
            resp([0x80, 0x00, 0x14, 0x02, 0x22, 0x00, 0x00, 0x08])
        );
    }

    #[test]
    fn request_roundtrip() {
        let requests = [
            SdoRequest::expedited_download(0x2000, 3, &[0xAA]),
            SdoRequest::initiate_download(0x2000, 3, 300),
            SdoRequest::download_segment(true, false, &[1, 2, 3]),
            SdoRequest::initiate_upload(0x1008, 0),
            SdoRequest::upload_segment_request(true),
            SdoRequest::abort(0x1008, 0, AbortCode::SdoTimeout),
        ];
        for request in requests {
            let bytes = request.to_bytes();
            assert_eq!(request, SdoRequest::try_from(&bytes[..]).unwrap());
        }
    }

    #[test]
    fn response_roundtrip() {
        let responses = [
            SdoResponse::expedited_upload(0x1018, 1, &[0xFE, 0xCA]),
            SdoResponse::upload_acknowledge(0x1008, 0, Some(9)),
            SdoResponse::upload_acknowledge(0x1008, 0, None),
            SdoResponse::upload_segment(false, false, &[1, 2, 3, 4, 5, 6, 7]),
            SdoResponse::download_acknowledge(0x1400, 2),
            SdoResponse::download_segment_acknowledge(true),
            SdoResponse::abort(0x1400, 2, AbortCode::NoSuchObject),
        ];
        for response in responses {
            let msg = response.to_can_message(CanId::std(0x581));
            assert_eq!(response, SdoResponse::try_from(msg).unwrap());
        }
    }

    #[test]
    fn short_frames_are_rejected() {
        let msg = CanMessage::new(CanId::std(0x581), &[0x60, 0, 0, 0]);
        assert!(SdoResponse::try_from(msg).is_err());

        let bytes = [0x40, 0x18, 0x10, 0x01];
        assert_eq!(
            Err(AbortCode::GeneralError),
            SdoRequest::try_from(&bytes[..])
        );
    }

    #[test]
    fn unknown_command_specifiers_are_rejected() {
        // 0xE0: cs=7 is not a valid server command
        let msg = CanMessage::new(CanId::std(0x581), &[0xE0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(SdoResponse::try_from(msg).is_err());

        let bytes = [0xA0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            Err(AbortCode::InvalidCommandSpecifier),
            SdoRequest::try_from(&bytes[..])
        );
    }

    #[test]
    fn abort_catalogue_text() {
        assert_eq!(
            "Data cannot be transferred or stored to the application because of the present device state.",
            abort_code_text(0x0800_0022)
        );
        assert_eq!("Toggle bit not alternated.", abort_code_text(0x0503_0000));
        assert_eq!("Abort code is reserved", abort_code_text(0xDEAD_BEEF));
    }
}
