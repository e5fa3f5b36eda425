//! Blocking SDO client
//!
//! The client exposes synchronous `read`/`write` calls, but the protocol
//! itself is advanced by the bus listener: every received frame is validated
//! against the last request sent, the next frame of the transfer (or an
//! abort) goes out from the listener, and completion is signalled to the
//! waiting caller through a condition variable.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use snafu::Snafu;

use cansdo_common::messages::{SDO_REQ_BASE, SDO_RESP_BASE};
use cansdo_common::objects::object_ids;
use cansdo_common::sdo::{abort_code_text, AbortCode, SdoRequest, SdoResponse};
use cansdo_common::traits::{CanSender, ObjectCache};
use cansdo_common::{CanId, CanMessage, NodeId, ObjectEntry, SdoCobId};

use crate::frame_router::{FrameRouter, ListenerHandle};

/// How long to wait for the server to finish an outstanding transfer
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a caller may wait for a concurrent transfer to release the client
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// A wrapper around the AbortCode enum to allow for unknown values
///
/// Although the library should "know" all the abort codes, it is possible to
/// receive other values and this allows those to be captured and exposed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawAbortCode {
    /// A recognized abort code
    Valid(AbortCode),
    /// An unrecognized abort code
    Unknown(u32),
}

impl RawAbortCode {
    /// The raw 32-bit code
    pub fn raw(&self) -> u32 {
        match self {
            RawAbortCode::Valid(code) => *code as u32,
            RawAbortCode::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for RawAbortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawAbortCode::Valid(code) => write!(f, "{code}"),
            RawAbortCode::Unknown(code) => write!(f, "unknown abort code 0x{code:08X}"),
        }
    }
}

impl From<u32> for RawAbortCode {
    fn from(value: u32) -> Self {
        match AbortCode::try_from(value) {
            Ok(code) => Self::Valid(code),
            Err(_) => Self::Unknown(value),
        }
    }
}

/// Error returned by [`SdoClient`] methods
#[derive(Clone, Copy, Debug, PartialEq, Snafu)]
pub enum SdoClientError {
    /// The server did not finish the transfer within the response timeout
    #[snafu(display("SDO transfer timed out"))]
    Timeout,
    /// Another transfer did not release the client within the acquisition bound
    #[snafu(display("SDO client is busy with another transfer"))]
    Busy,
    /// The transfer completed without moving the expected number of bytes
    #[snafu(display("transfer ended after {transferred} of {expected} bytes"))]
    IncompleteTransfer {
        /// Bytes actually transferred
        transferred: usize,
        /// Bytes the transfer was expected to move
        expected: usize,
    },
    /// The server aborted the transfer
    #[snafu(display("server aborted transfer of 0x{index:04X}sub{sub}: {abort_code}"))]
    ServerAbort {
        /// Index of the aborted access
        index: u16,
        /// Sub-index of the aborted access
        sub: u8,
        /// Reason quoted by the server
        abort_code: RawAbortCode,
    },
    /// The client aborted the transfer after detecting a protocol violation
    #[snafu(display("transfer aborted: {abort_code}"))]
    LocalAbort {
        /// The reason sent to the server
        abort_code: AbortCode,
    },
    /// A frame could not be handed to the CAN interface
    #[snafu(display("failed to queue frame for transmission"))]
    SendFailed,
    /// A value had a size the operation cannot represent
    #[snafu(display("object value has an unsupported or unexpected size"))]
    UnexpectedSize,
}

type Result<T> = std::result::Result<T, SdoClientError>;

/// How an in-flight transfer ended, as recorded by the listener
#[derive(Clone, Copy, Debug, PartialEq)]
enum TransferOutcome {
    Complete,
    RemoteAbort(u32),
    LocalAbort(AbortCode),
}

/// State of the one transfer a client can have in flight
struct Transfer {
    entry: ObjectEntry,
    buffer: Vec<u8>,
    offset: usize,
    total: usize,
    last_sent: SdoRequest,
    outcome: Option<TransferOutcome>,
}

#[derive(Default)]
struct ClientState {
    transfer: Option<Transfer>,
}

struct Shared<S> {
    state: Mutex<ClientState>,
    cond: Condvar,
    sender: Mutex<S>,
    client_id: CanId,
    server_id: CanId,
}

/// Compose the next download segment at the current offset and advance it
fn next_download_segment(transfer: &mut Transfer, toggle: bool) -> SdoRequest {
    let len = (transfer.total - transfer.offset).min(7);
    let chunk = &transfer.buffer[transfer.offset..transfer.offset + len];
    let last = transfer.offset + len == transfer.total;
    let request = SdoRequest::download_segment(toggle, last, chunk);
    transfer.offset += len;
    request
}

impl<S: CanSender> Shared<S> {
    fn send_frame(&self, request: SdoRequest) -> std::result::Result<(), ()> {
        let msg = request.to_can_message(self.client_id);
        self.sender.lock().unwrap().send(msg).map_err(|_| ())
    }

    /// Record `request` as the outstanding one and put it on the wire
    fn advance(&self, transfer: &mut Transfer, request: SdoRequest) {
        transfer.last_sent = request;
        if self.send_frame(request).is_err() {
            log::error!("failed to queue SDO frame; transfer will time out");
        }
    }

    /// Abort the in-flight transfer for a locally detected violation
    fn fail_transfer(&self, transfer: &mut Transfer, code: AbortCode) {
        log::warn!(
            "aborting SDO transfer of 0x{:04X}sub{}: {}",
            transfer.entry.index,
            transfer.entry.sub_index,
            code
        );
        let request = SdoRequest::abort(transfer.entry.index, transfer.entry.sub_index, code);
        if self.send_frame(request).is_err() {
            log::error!("failed to queue SDO abort frame");
        }
        transfer.offset = 0;
        transfer.outcome = Some(TransferOutcome::LocalAbort(code));
    }

    /// Drive the state machine with one received frame
    fn handle_frame(&self, msg: CanMessage) {
        let mut state = self.state.lock().unwrap();
        let Some(transfer) = state.transfer.as_mut() else {
            log::trace!("ignoring frame on {:?}: no transfer in flight", self.server_id);
            return;
        };
        if transfer.outcome.is_some() {
            // already settled; the caller has not collected the result yet
            return;
        }

        let response = if msg.dlc == 8 {
            SdoResponse::try_from(msg).ok()
        } else {
            None
        };
        let Some(response) = response else {
            self.fail_transfer(transfer, AbortCode::GeneralError);
            self.cond.notify_all();
            return;
        };

        match response {
            SdoResponse::ConfirmDownload { index, sub } => match transfer.last_sent {
                SdoRequest::InitiateDownload {
                    index: req_index,
                    sub: req_sub,
                    ..
                } if index == req_index && sub == req_sub => {
                    if transfer.offset < transfer.total {
                        let request = next_download_segment(transfer, false);
                        self.advance(transfer, request);
                    } else {
                        transfer.outcome = Some(TransferOutcome::Complete);
                    }
                }
                _ => self.fail_transfer(transfer, AbortCode::GeneralError),
            },
            SdoResponse::ConfirmDownloadSegment { t } => match transfer.last_sent {
                SdoRequest::DownloadSegment { t: sent_toggle, .. } => {
                    if t != sent_toggle {
                        self.fail_transfer(transfer, AbortCode::ToggleNotAlternated);
                    } else if transfer.offset < transfer.total {
                        let request = next_download_segment(transfer, !t);
                        self.advance(transfer, request);
                    } else {
                        transfer.outcome = Some(TransferOutcome::Complete);
                    }
                }
                _ => self.fail_transfer(transfer, AbortCode::GeneralError),
            },
            SdoResponse::ConfirmUpload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => match transfer.last_sent {
                SdoRequest::InitiateUpload {
                    index: req_index,
                    sub: req_sub,
                } if index == req_index && sub == req_sub => {
                    let declared = response.indicated_size().unwrap_or(0);
                    if declared != 0 && transfer.total != 0 && declared != transfer.total {
                        self.fail_transfer(transfer, AbortCode::DataTypeMismatch);
                    } else if e {
                        if transfer.total > 4 {
                            // an expedited answer cannot satisfy this request
                            self.fail_transfer(transfer, AbortCode::GeneralError);
                        } else {
                            let len = if s { 4 - n as usize } else { transfer.total };
                            transfer.buffer.resize(len, 0);
                            transfer.buffer.copy_from_slice(&data[..len]);
                            transfer.offset = len;
                            transfer.total = len;
                            transfer.outcome = Some(TransferOutcome::Complete);
                        }
                    } else {
                        if s && transfer.total == 0 {
                            transfer.total = declared;
                            transfer.buffer.resize(declared, 0);
                        }
                        self.advance(transfer, SdoRequest::upload_segment_request(false));
                    }
                }
                _ => self.fail_transfer(transfer, AbortCode::GeneralError),
            },
            SdoResponse::UploadSegment { t, n, c, data } => match transfer.last_sent {
                SdoRequest::ReqUploadSegment { t: sent_toggle } => {
                    if t != sent_toggle {
                        self.fail_transfer(transfer, AbortCode::ToggleNotAlternated);
                    } else {
                        let len = 7 - n as usize;
                        if transfer.total == 0 {
                            transfer.buffer.resize(transfer.offset + len, 0);
                        }
                        if transfer.offset + len > transfer.buffer.len() {
                            log::warn!(
                                "upload segment overflows buffer: {} + {} > {}",
                                transfer.offset,
                                len,
                                transfer.buffer.len()
                            );
                            self.fail_transfer(transfer, AbortCode::DataTypeMismatch);
                        } else {
                            transfer.buffer[transfer.offset..transfer.offset + len]
                                .copy_from_slice(&data[..len]);
                            transfer.offset += len;
                            if c || (transfer.total != 0 && transfer.offset == transfer.total) {
                                if transfer.total == 0 {
                                    // size was never declared; the final
                                    // segment defines it
                                    transfer.total = transfer.offset;
                                }
                                transfer.outcome = Some(TransferOutcome::Complete);
                            } else {
                                self.advance(transfer, SdoRequest::upload_segment_request(!t));
                            }
                        }
                    }
                }
                _ => self.fail_transfer(transfer, AbortCode::GeneralError),
            },
            SdoResponse::Abort { abort_code, .. } => {
                log::warn!(
                    "server aborted SDO transfer of 0x{:04X}sub{}: {}",
                    transfer.entry.index,
                    transfer.entry.sub_index,
                    abort_code_text(abort_code)
                );
                transfer.offset = 0;
                transfer.outcome = Some(TransferOutcome::RemoteAbort(abort_code));
            }
        }

        if transfer.outcome.is_some() {
            self.cond.notify_all();
        }
    }

    /// Run one transfer to completion: acquire the client, send the initiate
    /// frame, and block until the listener settles the outcome or the
    /// response timeout expires. Returns the final buffer.
    fn run_transfer(
        &self,
        entry: ObjectEntry,
        buffer: Vec<u8>,
        offset: usize,
        total: usize,
        initial: SdoRequest,
    ) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let (mut state, acquire) = self
            .cond
            .wait_timeout_while(state, ACQUIRE_TIMEOUT, |s| s.transfer.is_some())
            .unwrap();
        if acquire.timed_out() {
            return BusySnafu.fail();
        }

        state.transfer = Some(Transfer {
            entry,
            buffer,
            offset,
            total,
            last_sent: initial,
            outcome: None,
        });
        if self.send_frame(initial).is_err() {
            state.transfer = None;
            self.cond.notify_all();
            return SendFailedSnafu.fail();
        }

        let (mut state, _) = self
            .cond
            .wait_timeout_while(state, RESPONSE_TIMEOUT, |s| {
                s.transfer.as_ref().is_some_and(|t| t.outcome.is_none())
            })
            .unwrap();
        let Some(transfer) = state.transfer.take() else {
            return TimeoutSnafu.fail();
        };
        self.cond.notify_all();
        drop(state);

        match transfer.outcome {
            None => {
                log::warn!(
                    "SDO transfer of 0x{:04X}sub{} timed out",
                    transfer.entry.index,
                    transfer.entry.sub_index
                );
                let request = SdoRequest::abort(
                    transfer.entry.index,
                    transfer.entry.sub_index,
                    AbortCode::SdoTimeout,
                );
                if self.send_frame(request).is_err() {
                    log::error!("failed to queue SDO abort frame");
                }
                TimeoutSnafu.fail()
            }
            Some(TransferOutcome::RemoteAbort(code)) => ServerAbortSnafu {
                index: transfer.entry.index,
                sub: transfer.entry.sub_index,
                abort_code: RawAbortCode::from(code),
            }
            .fail(),
            Some(TransferOutcome::LocalAbort(code)) => LocalAbortSnafu { abort_code: code }.fail(),
            Some(TransferOutcome::Complete) => {
                if transfer.offset == 0 || transfer.offset != transfer.total {
                    IncompleteTransferSnafu {
                        transferred: transfer.offset,
                        expected: transfer.total,
                    }
                    .fail()
                } else {
                    Ok(transfer.buffer)
                }
            }
        }
    }
}

/// A client for accessing a node's SDO server
///
/// One client serves one server. Calls serialize on the client; it can be
/// shared between threads behind an `Arc`.
pub struct SdoClient<S> {
    shared: Arc<Shared<S>>,
    _listener: ListenerHandle,
}

impl<S> std::fmt::Debug for SdoClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdoClient")
            .field("client_id", &self.shared.client_id)
            .field("server_id", &self.shared.server_id)
            .finish()
    }
}

impl<S: CanSender + Send + 'static> SdoClient<S> {
    /// Create a new SdoClient from request and response COB-IDs
    ///
    /// Registers a listener for `server_id` frames on the router; the
    /// listener lives as long as the client.
    pub fn new(client_id: CanId, server_id: CanId, sender: S, router: &FrameRouter) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(ClientState::default()),
            cond: Condvar::new(),
            sender: Mutex::new(sender),
            client_id,
            server_id,
        });
        let handler = shared.clone();
        let listener = router.add_listener(server_id, move |msg| handler.handle_frame(msg));
        Self {
            shared,
            _listener: listener,
        }
    }

    /// Create a new SdoClient for a node's default SDO server
    ///
    /// Applies the pre-defined connection set: requests on `0x600 + node`,
    /// responses on `0x580 + node`.
    pub fn new_std(node_id: NodeId, sender: S, router: &FrameRouter) -> Self {
        let client_id = CanId::Std(SDO_REQ_BASE + node_id.raw() as u16);
        let server_id = CanId::Std(SDO_RESP_BASE + node_id.raw() as u16);
        Self::new(client_id, server_id, sender, router)
    }

    /// Create a new SdoClient with COB-IDs resolved from a dictionary cache
    ///
    /// Reads the SDO server parameter object (0x1200, subs 1 and 2) through
    /// `cache`; either ID falls back to the pre-defined connection set when
    /// the entry is not cached.
    pub fn from_cache<C: ObjectCache>(
        cache: &C,
        node_id: NodeId,
        sender: S,
        router: &FrameRouter,
    ) -> Self {
        let client_id = cache
            .get_cached(object_ids::SDO_SERVER_PARAMS, 1)
            .map(|raw| SdoCobId::new(raw).can_id())
            .unwrap_or(CanId::Std(SDO_REQ_BASE + node_id.raw() as u16));
        let server_id = cache
            .get_cached(object_ids::SDO_SERVER_PARAMS, 2)
            .map(|raw| SdoCobId::new(raw).can_id())
            .unwrap_or(CanId::Std(SDO_RESP_BASE + node_id.raw() as u16));
        Self::new(client_id, server_id, sender, router)
    }

    /// Read an object's value from the SDO server
    ///
    /// A non-empty `data` buffer pre-declares the expected size; the
    /// transfer fails if the server announces a different one. An empty
    /// buffer accepts whatever size the server reveals. On success `data`
    /// holds exactly the value; on failure it is left empty.
    pub fn read(&self, entry: ObjectEntry, data: &mut Vec<u8>) -> Result<()> {
        let request = SdoRequest::initiate_upload(entry.index, entry.sub_index);
        let buffer = std::mem::take(data);
        let total = buffer.len();
        *data = self.shared.run_transfer(entry, buffer, 0, total, request)?;
        Ok(())
    }

    /// Write a value to an object on the SDO server
    ///
    /// Values of up to 4 bytes go out as a single expedited frame; longer
    /// values run the segmented protocol. Values beyond 65535 bytes cannot
    /// be announced in the initiate frame and are rejected.
    pub fn write(&self, entry: ObjectEntry, data: &[u8]) -> Result<()> {
        let total = data.len();
        if total > u16::MAX as usize {
            return UnexpectedSizeSnafu.fail();
        }
        let (request, offset) = if total <= 4 {
            (
                SdoRequest::expedited_download(entry.index, entry.sub_index, data),
                total,
            )
        } else {
            (
                SdoRequest::initiate_download(entry.index, entry.sub_index, total as u16),
                0,
            )
        };
        self.shared
            .run_transfer(entry, data.to_vec(), offset, total, request)?;
        Ok(())
    }

    /// Read an object, expecting a u8 value
    pub fn read_u8(&self, entry: ObjectEntry) -> Result<u8> {
        let mut data = Vec::new();
        self.read(entry, &mut data)?;
        if data.len() != 1 {
            return UnexpectedSizeSnafu.fail();
        }
        Ok(data[0])
    }

    /// Read an object, expecting a u16 value
    pub fn read_u16(&self, entry: ObjectEntry) -> Result<u16> {
        let mut data = Vec::new();
        self.read(entry, &mut data)?;
        if data.len() != 2 {
            return UnexpectedSizeSnafu.fail();
        }
        Ok(u16::from_le_bytes(data.try_into().unwrap()))
    }

    /// Read an object, expecting a u32 value
    pub fn read_u32(&self, entry: ObjectEntry) -> Result<u32> {
        let mut data = Vec::new();
        self.read(entry, &mut data)?;
        if data.len() != 4 {
            return UnexpectedSizeSnafu.fail();
        }
        Ok(u32::from_le_bytes(data.try_into().unwrap()))
    }

    /// Read an object, expecting an i32 value
    pub fn read_i32(&self, entry: ObjectEntry) -> Result<i32> {
        Ok(self.read_u32(entry)? as i32)
    }

    /// Read an object as a visible string
    ///
    /// The value is read and assumed to contain valid UTF8 characters.
    pub fn read_visible_string(&self, entry: ObjectEntry) -> Result<String> {
        let mut data = Vec::new();
        self.read(entry, &mut data)?;
        Ok(String::from_utf8_lossy(&data).into())
    }

    /// Write a u8 value to an object
    pub fn write_u8(&self, entry: ObjectEntry, value: u8) -> Result<()> {
        self.write(entry, &value.to_le_bytes())
    }

    /// Write a u16 value to an object
    pub fn write_u16(&self, entry: ObjectEntry, value: u16) -> Result<()> {
        self.write(entry, &value.to_le_bytes())
    }

    /// Write a u32 value to an object
    pub fn write_u32(&self, entry: ObjectEntry, value: u32) -> Result<()> {
        self.write(entry, &value.to_le_bytes())
    }

    /// Write an i32 value to an object
    pub fn write_i32(&self, entry: ObjectEntry, value: i32) -> Result<()> {
        self.write(entry, &value.to_le_bytes())
    }
}

#[cfg(feature = "socketcan")]
impl SdoClient<cansdo_common::SocketCanSender> {
    /// Open a SocketCAN device and create a client for a node's default SDO
    /// server
    ///
    /// The socket is filtered to the server's response COB-ID and split into
    /// the client's sender and a spawned [`FrameRouter`]. The router is
    /// returned alongside the client and must be kept alive with it.
    pub fn new_socketcan(
        node_id: NodeId,
        device: &str,
    ) -> std::io::Result<(Self, FrameRouter)> {
        let resp_id = SDO_RESP_BASE + node_id.raw() as u16;
        let filters = [cansdo_common::CanFilter::new(resp_id as u32, 0x7FF)];
        let (sender, receiver) = cansdo_common::open_socketcan(device, Some(&filters))?;
        let router = FrameRouter::spawn(receiver);
        let client = Self::new_std(node_id, sender, &router);
        Ok((client, router))
    }
}
