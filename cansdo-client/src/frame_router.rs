//! Fans received frames out to per-COB-ID listeners

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use cansdo_common::traits::CanReceiver;
use cansdo_common::{CanId, CanMessage};

/// Receive poll period; bounds how long drop can take to stop the thread
const POLL_PERIOD: Duration = Duration::from_millis(50);

struct ListenerEntry {
    id: CanId,
    token: u64,
    callback: Box<dyn FnMut(CanMessage) + Send>,
}

#[derive(Default)]
struct RouterInner {
    listeners: Vec<ListenerEntry>,
}

/// Owns the receive side of a CAN interface and dispatches incoming frames
/// to registered listeners by COB-ID
///
/// Listeners are invoked on the router's thread and must not block. Dropping
/// the router stops and joins the thread.
pub struct FrameRouter {
    inner: Arc<Mutex<RouterInner>>,
    stop: Arc<AtomicBool>,
    next_token: AtomicU64,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FrameRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRouter")
            .field("listeners", &self.inner.lock().unwrap().listeners.len())
            .finish()
    }
}

impl FrameRouter {
    /// Spawn a router thread draining `receiver`
    pub fn spawn<R>(mut receiver: R) -> Self
    where
        R: CanReceiver + Send + 'static,
    {
        let inner = Arc::new(Mutex::new(RouterInner::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let thread_inner = inner.clone();
        let thread_stop = stop.clone();
        let thread = std::thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                match receiver.recv(POLL_PERIOD) {
                    Ok(Some(msg)) => {
                        let mut inner = thread_inner.lock().unwrap();
                        for entry in inner.listeners.iter_mut() {
                            if entry.id == msg.id() {
                                (entry.callback)(msg);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::error!("CAN receiver failed, stopping frame dispatch: {e:?}");
                        break;
                    }
                }
            }
        });
        Self {
            inner,
            stop,
            next_token: AtomicU64::new(0),
            thread: Some(thread),
        }
    }

    /// Register `callback` for every frame whose ID equals `id`
    ///
    /// The returned handle unregisters the listener when dropped.
    pub fn add_listener<F>(&self, id: CanId, callback: F) -> ListenerHandle
    where
        F: FnMut(CanMessage) + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().unwrap().listeners.push(ListenerEntry {
            id,
            token,
            callback: Box::new(callback),
        });
        ListenerHandle {
            inner: Arc::downgrade(&self.inner),
            token,
        }
    }
}

impl Drop for FrameRouter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Keeps a [`FrameRouter`] listener registered; dropping it unregisters the
/// listener
pub struct ListenerHandle {
    inner: Weak<Mutex<RouterInner>>,
    token: u64,
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap();
            inner.listeners.retain(|entry| entry.token != self.token);
        }
    }
}
