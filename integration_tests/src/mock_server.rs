//! A thread-hosted SDO server backed by a map of object values
//!
//! Implements the expedited and segmented protocols in both directions,
//! enough to exercise a well-behaved client end to end. Protocol-violating
//! behavior is not scripted here; tests that need a misbehaving server drive
//! raw frames instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cansdo_common::messages::{SDO_REQ_BASE, SDO_RESP_BASE};
use cansdo_common::sdo::{AbortCode, SdoRequest, SdoResponse};
use cansdo_common::traits::{CanReceiver, CanSender};
use cansdo_common::CanId;

use crate::sim_bus::{SimBus, SimBusReceiver, SimBusSender};

type Dictionary = HashMap<(u16, u8), Vec<u8>>;

enum ServerTransfer {
    Idle,
    Uploading {
        data: Vec<u8>,
        offset: usize,
        toggle: bool,
    },
    Downloading {
        index: u16,
        sub: u8,
        received: Vec<u8>,
        toggle: bool,
    },
}

pub struct MockServer {
    dictionary: Arc<Mutex<Dictionary>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn spawn(bus: &SimBus, node_id: u8) -> Self {
        let dictionary: Arc<Mutex<Dictionary>> = Arc::new(Mutex::new(HashMap::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let receiver = bus.new_receiver();
        let sender = bus.new_sender();
        let thread = std::thread::spawn({
            let dictionary = dictionary.clone();
            let stop = stop.clone();
            move || serve(node_id, dictionary, stop, receiver, sender)
        });
        Self {
            dictionary,
            stop,
            thread: Some(thread),
        }
    }

    pub fn set_object(&self, index: u16, sub: u8, value: &[u8]) {
        self.dictionary
            .lock()
            .unwrap()
            .insert((index, sub), value.to_vec());
    }

    pub fn get_object(&self, index: u16, sub: u8) -> Option<Vec<u8>> {
        self.dictionary.lock().unwrap().get(&(index, sub)).cloned()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(
    node_id: u8,
    dictionary: Arc<Mutex<Dictionary>>,
    stop: Arc<AtomicBool>,
    mut receiver: SimBusReceiver,
    mut sender: SimBusSender,
) {
    let req_id = CanId::Std(SDO_REQ_BASE + node_id as u16);
    let resp_id = CanId::Std(SDO_RESP_BASE + node_id as u16);
    let mut state = ServerTransfer::Idle;

    while !stop.load(Ordering::Relaxed) {
        let msg = match receiver.recv(Duration::from_millis(50)) {
            Ok(Some(msg)) if msg.id() == req_id => msg,
            Ok(_) => continue,
            Err(_) => break,
        };
        let response = match SdoRequest::try_from(msg.data()) {
            Ok(request) => handle_request(&dictionary, &mut state, request),
            Err(code) => Some(SdoResponse::abort(0, 0, code)),
        };
        if let Some(response) = response {
            let _ = sender.send(response.to_can_message(resp_id));
        }
    }
}

fn handle_request(
    dictionary: &Mutex<Dictionary>,
    state: &mut ServerTransfer,
    request: SdoRequest,
) -> Option<SdoResponse> {
    match request {
        SdoRequest::InitiateUpload { index, sub } => {
            let value = dictionary.lock().unwrap().get(&(index, sub)).cloned();
            match value {
                None => {
                    *state = ServerTransfer::Idle;
                    Some(SdoResponse::abort(index, sub, AbortCode::NoSuchObject))
                }
                Some(data) if data.len() <= 4 => {
                    *state = ServerTransfer::Idle;
                    Some(SdoResponse::expedited_upload(index, sub, &data))
                }
                Some(data) => {
                    let size = data.len() as u16;
                    *state = ServerTransfer::Uploading {
                        data,
                        offset: 0,
                        toggle: false,
                    };
                    Some(SdoResponse::upload_acknowledge(index, sub, Some(size)))
                }
            }
        }
        SdoRequest::ReqUploadSegment { t } => match state {
            ServerTransfer::Uploading {
                data,
                offset,
                toggle,
            } => {
                if t != *toggle {
                    *state = ServerTransfer::Idle;
                    Some(SdoResponse::abort(0, 0, AbortCode::ToggleNotAlternated))
                } else {
                    let len = (data.len() - *offset).min(7);
                    let chunk = data[*offset..*offset + len].to_vec();
                    *offset += len;
                    let last = *offset == data.len();
                    *toggle = !*toggle;
                    let response = SdoResponse::upload_segment(t, last, &chunk);
                    if last {
                        *state = ServerTransfer::Idle;
                    }
                    Some(response)
                }
            }
            _ => Some(SdoResponse::abort(0, 0, AbortCode::GeneralError)),
        },
        SdoRequest::InitiateDownload {
            n, e, s, index, sub, data,
        } => {
            if e {
                let len = if s { 4 - n as usize } else { 4 };
                dictionary
                    .lock()
                    .unwrap()
                    .insert((index, sub), data[..len].to_vec());
                *state = ServerTransfer::Idle;
            } else {
                *state = ServerTransfer::Downloading {
                    index,
                    sub,
                    received: Vec::new(),
                    toggle: false,
                };
            }
            Some(SdoResponse::download_acknowledge(index, sub))
        }
        SdoRequest::DownloadSegment { t, n, c, data } => match state {
            ServerTransfer::Downloading {
                index,
                sub,
                received,
                toggle,
            } => {
                if t != *toggle {
                    *state = ServerTransfer::Idle;
                    Some(SdoResponse::abort(0, 0, AbortCode::ToggleNotAlternated))
                } else {
                    received.extend_from_slice(&data[..7 - n as usize]);
                    *toggle = !*toggle;
                    let response = SdoResponse::download_segment_acknowledge(t);
                    if c {
                        let key = (*index, *sub);
                        let value = std::mem::take(received);
                        dictionary.lock().unwrap().insert(key, value);
                        *state = ServerTransfer::Idle;
                    }
                    Some(response)
                }
            }
            _ => Some(SdoResponse::abort(0, 0, AbortCode::GeneralError)),
        },
        SdoRequest::Abort { .. } => {
            *state = ServerTransfer::Idle;
            None
        }
    }
}
